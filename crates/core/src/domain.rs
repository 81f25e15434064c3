//! Keyword scoring that routes a candidate to an interview track.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Technical,
    NonTechnical,
}

const TECH_DOMAINS: &[(&str, &[&str])] = &[
    ("frontend", &["React", "Angular", "Vue", "JavaScript", "TypeScript", "CSS", "HTML5"]),
    ("backend", &["Node.js", "Django", "Spring", "Go", "Rust", "Microservices", "APIs"]),
    ("AI", &["TensorFlow", "PyTorch", "NLP", "Computer Vision", "LLMs", "Generative AI"]),
    ("data science", &["data science", "Pandas", "NumPy", "SQL", "Data Visualization", "ETL", "Big Data"]),
    ("machine learning", &["machine learning", "Scikit-learn", "Keras", "Model Deployment", "Feature Engineering"]),
    ("devops", &["Docker", "Kubernetes", "AWS", "CI/CD", "Terraform", "Monitoring"]),
    ("mobile", &["Flutter", "React Native", "Swift", "Kotlin", "Mobile UX"]),
    ("python", &["Python", "Flask", "FastAPI", "Django", "Data Structures", "Algorithms"]),
    ("java", &["Java", "Spring Boot", "JVM", "Object Oriented Programming", "Collections"]),
    ("cpp", &["C++", "STL", "Memory Management", "Object Oriented Programming", "Data Structures"]),
];

const NON_TECH_DOMAINS: &[(&str, &[&str])] = &[
    ("edtech", &["Curriculum Design", "Learning Management Systems", "Instructional Design", "Educational Technology", "Student Engagement", "Assessment Tools"]),
    ("fintech", &["Digital Payments", "Blockchain", "Risk Management", "Financial Modeling", "Regulatory Compliance", "Banking Systems"]),
    ("healthcare", &["Healthcare IT", "Electronic Health Records", "Medical Billing", "Healthcare Analytics", "Telemedicine", "HIPAA Compliance"]),
    ("banking", &["Retail Banking", "Investment Banking", "Wealth Management", "Loan Processing", "Anti-Money Laundering", "Financial Analysis"]),
    ("insurance", &["Underwriting", "Claims Processing", "Actuarial Science", "Risk Assessment", "Policy Administration", "Customer Service"]),
];

/// Minimum technical score that keeps the candidate on the technical track.
const TECHNICAL_THRESHOLD: u32 = 2;

#[derive(Debug)]
struct Keyword {
    lowered: String,
    whole_word: Regex,
}

#[derive(Debug)]
pub struct Domain {
    name: String,
    track: Track,
    keywords: Vec<Keyword>,
}

impl Domain {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn is_technical(&self) -> bool {
        self.track == Track::Technical
    }

    // A keyword found as a substring earns 1; if it is also a whole word it
    // earns another 2 on top.
    fn score(&self, text_lower: &str) -> u32 {
        self.keywords
            .iter()
            .map(|kw| {
                let mut score = 0;
                if text_lower.contains(&kw.lowered) {
                    score += 1;
                }
                if kw.whole_word.is_match(text_lower) {
                    score += 2;
                }
                score
            })
            .sum()
    }
}

/// Read-only mapping from domain name to skill keywords, split into a
/// technical and a non-technical table. Iteration order is declaration order.
#[derive(Debug)]
pub struct DomainTable {
    technical: Vec<Domain>,
    non_technical: Vec<Domain>,
}

impl DomainTable {
    pub fn new(
        technical: &[(&str, &[&str])],
        non_technical: &[(&str, &[&str])],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            technical: build_domains(technical, Track::Technical)?,
            non_technical: build_domains(non_technical, Track::NonTechnical)?,
        })
    }

    /// The table the interviewer ships with.
    pub fn builtin() -> Self {
        Self::new(TECH_DOMAINS, NON_TECH_DOMAINS)
            .expect("escaped keywords always form valid patterns")
    }

    /// Picks the best technical domain; when that scores below 2 falls back to
    /// the best non-technical domain with any hit at all.
    pub fn classify(&self, text: &str) -> Option<&Domain> {
        if text.trim().is_empty() {
            return None;
        }
        let text_lower = text.to_lowercase();

        if let Some((domain, score)) = best(&self.technical, &text_lower) {
            if score >= TECHNICAL_THRESHOLD {
                return Some(domain);
            }
        }
        match best(&self.non_technical, &text_lower) {
            Some((domain, score)) if score > 0 => Some(domain),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.technical
            .iter()
            .chain(self.non_technical.iter())
            .find(|d| d.name == name)
    }

    pub fn is_technical(&self, name: &str) -> bool {
        self.technical.iter().any(|d| d.name == name)
    }
}

fn build_domains(table: &[(&str, &[&str])], track: Track) -> Result<Vec<Domain>, regex::Error> {
    table
        .iter()
        .map(|(name, skills)| {
            let keywords = skills
                .iter()
                .map(|skill| {
                    let lowered = skill.to_lowercase();
                    let whole_word = Regex::new(&format!(r"\b{}\b", regex::escape(&lowered)))?;
                    Ok(Keyword {
                        lowered,
                        whole_word,
                    })
                })
                .collect::<Result<Vec<_>, regex::Error>>()?;
            Ok(Domain {
                name: name.to_string(),
                track,
                keywords,
            })
        })
        .collect()
}

// Stable max: on equal scores the earlier domain wins.
fn best<'a>(domains: &'a [Domain], text_lower: &str) -> Option<(&'a Domain, u32)> {
    let mut best: Option<(&Domain, u32)> = None;
    for domain in domains {
        let score = domain.score(text_lower);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((domain, score)),
        }
    }
    best
}
