// Prompt template for resume screening.
// The output-format section is a contract with `screening::parser`. Keep the markers in sync.

use crate::screening::parser::{REASON_MARKER, SCORE_MARKER};

/// Screening prompt template.
/// Replace: {job_description}, {resume_text}, {score_marker}, {reason_marker}
pub const SCREENING_PROMPT_TEMPLATE: &str = r#"You are an expert HR recruiter screening resumes against a job description.

Job Description:
{job_description}

Candidate Resume Text:
{resume_text}

Task:
1. Compare the resume against the job description.
2. Give a relevance score out of 100 based on skills, experience, and context.
3. Provide a brief reason (2 lines) for the score.

Output Format strictly like this:
{score_marker} [Number]
{reason_marker} [Text]"#;

/// Builds the screening prompt for one resume. Both inputs are embedded verbatim.
///
/// The template is split around each input placeholder rather than using `replace`,
/// so placeholder-looking text inside either input is left untouched.
pub fn build_screening_prompt(resume_text: &str, job_description: &str) -> String {
    let (head, rest) = split_once_or_empty(SCREENING_PROMPT_TEMPLATE, "{job_description}");
    let (middle, tail) = split_once_or_empty(rest, "{resume_text}");
    let tail = tail
        .replace("{score_marker}", SCORE_MARKER)
        .replace("{reason_marker}", REASON_MARKER);

    let mut prompt =
        String::with_capacity(SCREENING_PROMPT_TEMPLATE.len() + job_description.len() + resume_text.len());
    prompt.push_str(head);
    prompt.push_str(job_description);
    prompt.push_str(middle);
    prompt.push_str(resume_text);
    prompt.push_str(&tail);
    prompt
}

fn split_once_or_empty<'a>(text: &'a str, placeholder: &str) -> (&'a str, &'a str) {
    text.split_once(placeholder).unwrap_or((text, ""))
}
