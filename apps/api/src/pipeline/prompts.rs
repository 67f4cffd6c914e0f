// All LLM prompt constants for the generation pipeline stages.

/// System prompt for job analysis — enforces JSON-only output.
pub const JOB_ANALYSIS_SYSTEM: &str =
    "You are an expert job-posting analyst and resume strategist. \
    Analyze a job posting and extract structured information. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Job analysis prompt template. Replace `{job_title}` and `{job_text}`
/// before sending.
pub const JOB_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following job posting and extract structured information.

Return a JSON object with this EXACT schema (no extra fields):
{
  "requirements": [
    {"text": "5+ years backend experience", "is_required": true}
  ],
  "keywords": [
    {"keyword": "Rust", "frequency": 5, "weight": 0.8, "weighted_score": 4.0}
  ],
  "seniority": "senior",
  "tone": "collaborative"
}

Rules:

KEYWORD WEIGHTS by position in the posting:
- Title / header: 1.0
- Requirements section ("Required:", "Must have:"): 0.8
- Responsibilities section ("You will:"): 0.6
- About the company: 0.3
weighted_score = frequency * weight

REQUIREMENTS: is_required=true for explicit must-haves ("required", "must have",
minimum years); is_required=false for nice-to-haves ("preferred", "a plus").

SENIORITY: "junior", "mid", "senior", "staff", "principal", or "unknown".

TONE (pick exactly one): "aggressive", "collaborative", "research", "product".

Extract ALL meaningful technical keywords (languages, frameworks, tools, concepts).

JOB TITLE: {job_title}

JOB POSTING:
{job_text}"#;

/// System prompt for profile compilation — enforces JSON-only output.
pub const PROFILE_COMPILATION_SYSTEM: &str =
    "You are an expert career coach selecting and ranking verified professional \
    experience against a target role. Use ONLY facts present in the profile. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Profile compilation prompt template.
/// Replace: {analysis_json}, {profile_json}
pub const PROFILE_COMPILATION_PROMPT_TEMPLATE: &str = r#"Given the job analysis and the candidate profile below, select and rank the profile content most relevant to this role.

Return a JSON object with this EXACT schema:
{
  "selected_experiences": [
    {"experience_id": "the-exact-uuid-from-the-profile", "relevance": 0.9, "highlights": ["..."]}
  ],
  "ranked_skills": [
    {"name": "Rust", "relevance": 0.95}
  ],
  "summary": "Two-sentence positioning summary for this candidate and role."
}

HARD RULES:
1. EVERY experience_id MUST match an id present in the profile — no exceptions
2. relevance is 0.0–1.0; order both lists by descending relevance
3. Use ONLY facts from the profile — no interpolation, no invention
4. Omit experiences with no relevant content for this role

JOB ANALYSIS:
{analysis_json}

CANDIDATE PROFILE:
{profile_json}"#;

/// System prompt for resume generation — plain text output.
pub const RESUME_SYSTEM: &str =
    "You are an expert resume writer producing a tailored, factual resume from \
    verified professional context. Use ONLY facts present in the provided \
    material. Respond with the resume text only — no preamble, no commentary.";

/// Resume generation prompt template.
/// Replace: {analysis_json}, {compilation_json}, {candidate_name}
pub const RESUME_PROMPT_TEMPLATE: &str = r#"Write a tailored resume for {candidate_name}.

Ground every line in the selected experience below. Incorporate the job's
keywords naturally where the experience supports them — never keyword-stuff,
never invent facts.

JOB ANALYSIS:
{analysis_json}

SELECTED EXPERIENCE AND SKILLS:
{compilation_json}

Structure: summary, experience (most relevant first, strong action verbs,
dense factual bullets), skills. Plain text, no markdown tables."#;

/// System prompt for cover letter generation — plain text output.
pub const COVER_LETTER_SYSTEM: &str =
    "You are an expert cover-letter writer producing a tailored, factual letter \
    from verified professional context. Use ONLY facts present in the provided \
    material. Respond with the letter text only — no preamble, no commentary.";

/// Cover letter generation prompt template.
/// Replace: {analysis_json}, {compilation_json}, {candidate_name}, {job_title}, {company}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a tailored cover letter from {candidate_name} for the role "{job_title}" at {company}.

Ground every claim in the selected experience below. Address the role's top
requirements directly; keep it under 350 words.

JOB ANALYSIS:
{analysis_json}

SELECTED EXPERIENCE AND SKILLS:
{compilation_json}"#;
