use eyre::Result;
use reqwest::Url;

use crate::browser::Strategy;
use crate::sites::{LoginPage, SiteDefinition, SiteKind, css, spec, url_with};

pub fn search_url(keyword: &str, location: &str) -> Result<Url> {
    url_with(
        "https://www.glassdoor.com/Job/jobs.htm",
        &[("sc.keyword", keyword), ("locKeyword", location)],
    )
}

pub fn definition() -> SiteDefinition {
    SiteDefinition {
        kind: SiteKind::Glassdoor,
        // email first, password on a second step
        login: Some(LoginPage {
            url: "https://www.glassdoor.com/member/profile/login".to_string(),
            email: spec(
                "email field",
                css(&[
                    "input#inlineUserEmail",
                    "input#userEmail",
                    "input[name='username']",
                    "input[type='email']",
                ]),
            ),
            password: spec(
                "password field",
                css(&["input#inlineUserPassword", "input[type='password']"]),
            ),
            continue_button: spec(
                "continue with email",
                vec![
                    Strategy::xpath("//button[contains(., 'Continue with email')]"),
                    Strategy::css("button[data-test='email-form-button']"),
                    Strategy::css("button[type='submit']"),
                ],
            ),
            submit: spec(
                "sign-in button",
                vec![
                    Strategy::css("button[data-test='sign-in-button']"),
                    Strategy::css("button[type='submit']"),
                ],
            ),
        }),

        job_cards: spec(
            "job card",
            css(&["[data-test='jobListing']", "li.react-job-listing"]),
        ),
        card_title: spec(
            "card title",
            css(&["a[data-test='job-link']", "[data-test='job-title']"]),
        ),
        card_company: spec("card company", css(&["[data-test='employer-name']"])),
        card_location: spec(
            "card location",
            css(&["[data-test='location']", "[data-test='emp-location']"]),
        ),
        card_link: spec(
            "card link",
            css(&["a[data-test='job-link']", "a[data-test='job-title']"]),
        ),

        detail_title: spec("job title", css(&["[data-test='job-title']", "h1"])),
        detail_company: spec("company name", css(&["[data-test='employer-name']"])),
        detail_description: spec(
            "job description",
            css(&["[class*='JobDetails_jobDescription']", "#JobDescriptionContainer"]),
        ),

        apply: spec(
            "Easy Apply button",
            vec![
                Strategy::css("button[data-test='easyApply']"),
                Strategy::css("button[data-test='apply-button']"),
                Strategy::css("button[aria-label*='Apply']"),
            ],
        )
        .containing("apply"),
        submit: spec(
            "submit button",
            vec![
                Strategy::xpath("//button[contains(., 'Submit your application')]"),
                Strategy::xpath("//button[contains(., 'Submit')]"),
            ],
        ),
        next: spec(
            "continue button",
            vec![Strategy::xpath("//button[contains(., 'Continue') or contains(., 'Next')]")],
        ),
        dismiss: spec(
            "close button",
            css(&["button[data-test='job-alert-modal-close']", "button.CloseButton"]),
        ),
        next_page: spec(
            "next results page",
            css(&["button[data-test='pagination-next']", "button[data-test='load-more']"]),
        ),
        form_fields: spec("form field", css(&["form input, form textarea, form select"])),
    }
}
