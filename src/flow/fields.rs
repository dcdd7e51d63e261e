use std::sync::LazyLock;

use regex::Regex;

use crate::browser::FieldDescriptor;
use crate::utils::config::Profile;

/// What a form field is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    FirstName,
    LastName,
    FullName,
    Email,
    Phone,
    Salary,
    Availability,
    ExperienceYears,
    WorkAuthorization,
    Visa,
    Location,
    LinkedIn,
    Website,
    CurrentTitle,
    CoverLetter,
    Education,
    Resume,
}

// First match wins, so the narrow patterns come before the broad ones.
static RULES: LazyLock<Vec<(FieldCategory, Regex)>> = LazyLock::new(|| {
    use FieldCategory::*;
    [
        (CoverLetter, r"cover|letter|motivation|why .*(interested|join|apply|company)"),
        (Visa, r"visa|sponsor"),
        (
            WorkAuthorization,
            r"authori[sz]ed|authori[sz]ation|legally|eligible to work|right to work",
        ),
        (
            ExperienceYears,
            r"years?\b.{0,30}experience|experience.{0,30}\byears?\b|how many years",
        ),
        (Salary, r"salary|compensation|pay expectation|desired pay|expected pay"),
        (Availability, r"availab|start date|notice period|when can you start"),
        (LinkedIn, r"linkedin"),
        (Website, r"website|portfolio|github|personal site"),
        (Email, r"e-?mail"),
        (Phone, r"phone|mobile|\btel\b"),
        (FirstName, r"first.?name|\bfname\b|given.?name|forename"),
        (LastName, r"last.?name|\blname\b|surname|family.?name"),
        (FullName, r"full.?name|^(name\s*)+$"),
        (Location, r"location|\bcity\b|address|where .* based"),
        (CurrentTitle, r"title|position|\brole\b|headline"),
        (Education, r"education|degree|university"),
    ]
    .into_iter()
    .filter_map(|(category, pattern)| Regex::new(pattern).ok().map(|re| (category, re)))
    .collect()
});

static RESUME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"resume|résumé|\bcv\b|curriculum").ok());

/// Category of `field`, or `None` when it should be left alone.
pub fn classify(field: &FieldDescriptor) -> Option<FieldCategory> {
    let haystack = field.haystack();
    if haystack.is_empty() {
        return None;
    }

    if field.is_file() {
        return RESUME
            .as_ref()
            .filter(|re| re.is_match(&haystack))
            .map(|_| FieldCategory::Resume);
    }

    RULES
        .iter()
        .find(|(_, re)| re.is_match(&haystack))
        .map(|(category, _)| *category)
}

fn yes_no(answer: bool) -> String {
    let answer = if answer { "Yes" } else { "No" };
    answer.to_string()
}

impl FieldCategory {
    /// Text typed into a free-form field of this category.
    pub fn value(&self, profile: &Profile) -> Option<String> {
        let value = match self {
            FieldCategory::FirstName => Some(profile.first_name.clone()),
            FieldCategory::LastName => Some(profile.last_name.clone()),
            FieldCategory::FullName => Some(profile.full_name()),
            FieldCategory::Email => Some(profile.email.clone()),
            FieldCategory::Phone => profile.phone.clone(),
            FieldCategory::Salary => profile.desired_salary.clone(),
            FieldCategory::Availability => profile.availability.clone(),
            FieldCategory::ExperienceYears => Some(profile.experience_years.to_string()),
            FieldCategory::WorkAuthorization => Some(yes_no(profile.work_authorized)),
            FieldCategory::Visa => Some(yes_no(profile.requires_sponsorship)),
            FieldCategory::Location => profile.location.clone(),
            FieldCategory::LinkedIn => profile.linkedin.clone(),
            FieldCategory::Website => profile.website.clone(),
            FieldCategory::CurrentTitle => profile.current_title.clone(),
            FieldCategory::CoverLetter => profile.cover_letter.clone(),
            FieldCategory::Education => profile.education.clone(),
            FieldCategory::Resume => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Option texts to look for in a `<select>` of this category, best
    /// first.
    pub fn select_candidates(&self, profile: &Profile) -> Vec<String> {
        match self {
            FieldCategory::ExperienceYears => {
                let years = profile.experience_years;
                let bucket = match years {
                    0 => "Less than 1 year",
                    1..=2 => "1-2 years",
                    3..=5 => "3-5 years",
                    _ => "5+ years",
                };
                vec![bucket.to_string(), years.to_string()]
            }
            FieldCategory::Education => {
                let education = profile.education.as_deref().unwrap_or_default().to_lowercase();
                let levels: &[&str] = if education.contains("phd") || education.contains("doctor") {
                    &["Doctor", "PhD", "Master's degree", "Master"]
                } else if education.contains("master") {
                    &["Master's degree", "Master"]
                } else {
                    &["Bachelor's degree", "Bachelor"]
                };
                levels.iter().map(|s| s.to_string()).collect()
            }
            other => other.value(profile).into_iter().collect(),
        }
    }
}
