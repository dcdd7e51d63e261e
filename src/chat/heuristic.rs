//! Offline answers used whenever no model is reachable. Pure functions of
//! their inputs.

use std::collections::BTreeSet;

use crate::chat::analyzer::{MatchScore, ScoreSource};
use crate::models::job::JobListing;
use crate::utils::config::Profile;

const COVER_LETTER: &str = include_str!("cover_letter.txt");

/// Profile skills (lowercased, de-duplicated) that appear in the job title
/// or description.
pub fn matched_skills(job: &JobListing, profile: &Profile) -> (Vec<String>, usize) {
    let text = format!("{} {}", job.title, job.description).to_lowercase();
    let skills: BTreeSet<String> = profile
        .skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let matched = skills
        .iter()
        .filter(|s| text.contains(s.as_str()))
        .cloned()
        .collect();
    (matched, skills.len())
}

pub fn score(job: &JobListing, profile: &Profile, threshold: f32) -> MatchScore {
    let (matched, total) = matched_skills(job, profile);
    let compatibility_score = (matched.len() as f32 / total.max(1) as f32).min(1.0);

    MatchScore {
        compatibility_score,
        should_apply: compatibility_score > threshold,
        reasoning: format!("Keyword analysis: {} skills matched", matched.len()),
        source: ScoreSource::Heuristic,
    }
}

pub fn cover_letter(job: &JobListing, profile: &Profile) -> String {
    let top_skills = match profile.skills.len() {
        0 => "software development".to_string(),
        _ => profile
            .skills
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    };

    COVER_LETTER
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{experience_years}", &profile.experience_years.to_string())
        .replace(
            "{current_title}",
            profile.current_title.as_deref().unwrap_or("software development"),
        )
        .replace("{top_skills}", &top_skills)
        .replace("{name}", &profile.full_name())
        .trim()
        .to_string()
}
