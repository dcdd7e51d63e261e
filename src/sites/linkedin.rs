use eyre::Result;
use reqwest::Url;

use crate::browser::Strategy;
use crate::sites::{LoginPage, SiteDefinition, SiteKind, css, spec, url_with};

const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";

/// `f_E` codes of the experience-level filter.
fn experience_code(level: &str) -> Option<&'static str> {
    let level = level.to_lowercase();
    let code = if level.contains("intern") {
        "1"
    } else if level.contains("entry") {
        "2"
    } else if level.contains("associate") {
        "3"
    } else if level.contains("mid") || level.contains("senior") {
        "4"
    } else if level.contains("director") {
        "5"
    } else if level.contains("executive") {
        "6"
    } else {
        return None;
    };
    Some(code)
}

/// Search restricted to Easy Apply postings.
pub fn search_url(keyword: &str, location: &str, experience_level: Option<&str>) -> Result<Url> {
    let level = experience_level.and_then(experience_code).unwrap_or_default();
    url_with(
        SEARCH_URL,
        &[
            ("keywords", keyword),
            ("location", location),
            ("f_AL", "true"),
            ("f_E", level),
        ],
    )
}

pub fn definition() -> SiteDefinition {
    SiteDefinition {
        kind: SiteKind::LinkedIn,
        login: Some(LoginPage {
            url: "https://www.linkedin.com/login".to_string(),
            email: spec(
                "email field",
                css(&["#username", "input[name='session_key']", "input[type='email']"]),
            ),
            password: spec(
                "password field",
                css(&["#password", "input[name='session_password']", "input[type='password']"]),
            ),
            continue_button: spec("continue button", vec![]),
            submit: spec(
                "sign-in button",
                vec![
                    Strategy::css("button[type='submit']"),
                    Strategy::xpath("//button[contains(., 'Sign in')]"),
                ],
            ),
        }),

        job_cards: spec(
            "job card",
            css(&[
                ".jobs-search-results__list-item",
                ".job-card-container",
                "[data-job-id]",
                ".job-search-card",
            ]),
        ),
        card_title: spec(
            "card title",
            css(&[
                ".job-card-list__title",
                ".base-search-card__title",
                "a.job-card-container__link",
            ]),
        ),
        card_company: spec(
            "card company",
            css(&[
                ".artdeco-entity-lockup__subtitle",
                ".job-card-container__primary-description",
                ".base-search-card__subtitle",
            ]),
        ),
        card_location: spec(
            "card location",
            css(&[".job-card-container__metadata-item", ".job-search-card__location"]),
        ),
        card_link: spec(
            "card link",
            css(&[
                "a.job-card-list__title",
                "a.job-card-container__link",
                ".base-card__full-link",
                "a[href*='/jobs/view/']",
            ]),
        ),

        detail_title: spec(
            "job title",
            css(&[
                ".job-details-jobs-unified-top-card__job-title",
                ".jobs-unified-top-card__job-title",
                "h1",
            ]),
        ),
        detail_company: spec(
            "company name",
            css(&[
                ".job-details-jobs-unified-top-card__company-name",
                ".jobs-unified-top-card__company-name",
            ]),
        ),
        detail_description: spec(
            "job description",
            css(&["#job-details", ".jobs-description__content", ".jobs-box__html-content"]),
        ),

        apply: spec(
            "Easy Apply button",
            vec![
                Strategy::xpath("//button[contains(@aria-label, 'Easy Apply')]"),
                Strategy::xpath("//button[contains(text(), 'Easy Apply')]"),
                Strategy::css(".jobs-apply-button"),
            ],
        )
        .containing("easy apply"),
        submit: spec(
            "submit button",
            vec![
                Strategy::css("button[aria-label*='Submit']"),
                Strategy::xpath("//button[contains(text(), 'Submit application')]"),
                Strategy::css(".jobs-apply-form__submit-button"),
            ],
        ),
        next: spec(
            "next button",
            vec![
                Strategy::css("button[aria-label*='Continue']"),
                Strategy::css("button[aria-label*='Next']"),
                Strategy::css("button[aria-label*='Review']"),
                Strategy::xpath(
                    "//button[contains(., 'Next') or contains(., 'Continue') or contains(., 'Review')]",
                ),
                Strategy::css(".artdeco-button--primary"),
            ],
        ),
        dismiss: spec(
            "dismiss button",
            css(&["button[aria-label='Dismiss']", ".artdeco-modal__dismiss"]),
        ),
        next_page: spec(
            "next results page",
            vec![
                Strategy::xpath("//button[@aria-label='View next page']"),
                Strategy::css(".jobs-search-pagination__button--next"),
            ],
        ),
        form_fields: spec(
            "form field",
            css(&[
                ".jobs-easy-apply-modal input, .jobs-easy-apply-modal textarea, .jobs-easy-apply-modal select",
                "form input, form textarea, form select",
            ]),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_filters_easy_apply_and_level() {
        let url =
            search_url("Rust Developer", "Berlin, Germany", Some("Mid-Senior level")).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(url.as_str().starts_with(SEARCH_URL));
        assert!(pairs.contains(&("keywords".into(), "Rust Developer".into())));
        assert!(pairs.contains(&("location".into(), "Berlin, Germany".into())));
        assert!(pairs.contains(&("f_AL".into(), "true".into())));
        assert!(pairs.contains(&("f_E".into(), "4".into())));
    }

    #[test]
    fn unknown_levels_are_left_out() {
        let url = search_url("Rust", "Remote", Some("wizard")).unwrap();
        assert!(!url.as_str().contains("f_E"));
        assert_eq!(experience_code("Entry level"), Some("2"));
        assert_eq!(experience_code("Internship"), Some("1"));
    }
}
