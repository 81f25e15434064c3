pub mod config;
pub mod console;
pub mod gemini_adapter;
pub mod openai_adapter;
pub mod window;
