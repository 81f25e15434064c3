//! Prompt templates sent to the text generator.

pub fn interview_question(domain: Option<&str>, technical: bool, recent: &str) -> String {
    if technical {
        format!(
            "As a friendly technical interviewer, ask one engaging question about {} \
based on this conversation context. The question should:
- Be encouraging and conversational
- Build on what the candidate has already shared
- Test practical knowledge and experience
- Be appropriate for their stated experience level
- Keep it to one clear question
- Focus on real-world application
- Do not repeat same question again
- Question should be one-liner

Recent conversation: {recent}

Generate only the question in a friendly, conversational tone.",
            domain.unwrap_or("technology")
        )
    } else {
        format!(
            "As a friendly professional interviewer, ask one engaging question about {} \
based on this conversation context. The question should:
- Be encouraging and conversational
- Focus on real-world professional scenarios
- Test domain knowledge and problem-solving
- Be appropriate for their stated experience level
- Keep it to one clear question
- Focus on practical situations
- Do not repeat same question again
- Question should be one-liner

Recent conversation: {recent}

Generate only the question in a friendly, conversational tone.",
            domain.unwrap_or("professional work")
        )
    }
}

pub fn background_followup(domain: &str, context: &str) -> String {
    format!(
        "As a friendly interviewer specializing in {domain}, generate one concise follow-up question \
based on this conversation context. The question should:
- Be relevant to {domain}
- Reference specific technologies or practices mentioned if possible
- Be conversational and encouraging
- Be no longer than one sentence
- Focus on practical experience and understanding

Conversation context:
{context}

Generate only the question, no additional text."
    )
}

pub fn rephrase(question: &str) -> String {
    format!(
        "Rephrase this interview question to make it clearer while keeping the same meaning:
Original: {question}

Requirements:
- Keep technical accuracy
- Maintain same difficulty level
- Don't change the core concept being tested
- Make it slightly different wording
- Keep it one sentence

Return only the rephrased question."
    )
}

pub fn explanation(question: &str) -> String {
    format!(
        "The candidate couldn't answer this question after multiple attempts:
Question: {question}

Please provide a concise, helpful answer (2-3 sentences) that:
- Explains the key concept
- Gives a simple example if applicable
- Is encouraging

Keep it professional and educational."
    )
}

pub fn coding_problem(domain: &str, language: &str) -> String {
    format!(
        "Generate a medium level coding problem suitable for a technical interview in {domain}.

Requirements:
- Should be solvable in {language}
- Should take 10-15 minutes to solve
- Include a clear problem statement
- Provide input/output examples
- Should test algorithmic thinking and {domain} knowledge

Format your response as:
Problem: [Clear problem statement]

Example Input: [Sample input]
Example Output: [Expected output]

Constraints: [Any constraints or edge cases to consider]

Generate only the problem, no solution."
    )
}

pub fn hint(problem: &str) -> String {
    format!(
        "You are an AI coding interviewer. Give a small hint for the following problem.
It should not reveal the full solution, just nudge the candidate in the right direction.

Problem:
{problem}

Format: Hint: [short helpful nudge]"
    )
}

pub fn approach_followup(problem: &str, approach: &str) -> String {
    format!(
        "You are an expert software engineer interviewing a candidate.
Problem:
{problem}

The candidate described this approach:
{approach}

Ask one follow-up question that probes edge cases, complexity or possible improvements \
of this approach. Generate only the question, no additional text."
    )
}

fn framing(technical: bool) -> (&'static str, &'static str) {
    if technical {
        ("technical", "technically")
    } else {
        ("professional", "professionally")
    }
}

pub fn closing_answer(question: &str, technical: bool) -> String {
    let (kind, manner) = framing(technical);
    format!(
        "Provide a concise but helpful answer to this {kind} question:
Question: {question}

Requirements:
- Keep answer under 4 sentences
- Be {manner} accurate
- Include one practical example if relevant
- End by asking if they'd like clarification"
    )
}

pub fn elaboration(question: &str, answer: &str, technical: bool) -> String {
    let (_, manner) = framing(technical);
    format!(
        "Provide more detailed explanation about:
{question}

Context:
{answer}

Requirements:
- Go deeper {manner}
- Include examples
- Keep to 5-6 sentences max"
    )
}
