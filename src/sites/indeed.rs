use eyre::Result;
use reqwest::Url;

use crate::browser::Strategy;
use crate::sites::{LoginPage, SiteDefinition, SiteKind, css, spec, url_with};

pub fn search_url(keyword: &str, location: &str) -> Result<Url> {
    url_with(
        "https://www.indeed.com/jobs",
        &[("q", keyword), ("l", location), ("sort", "date")],
    )
}

pub fn definition() -> SiteDefinition {
    SiteDefinition {
        kind: SiteKind::Indeed,
        login: Some(LoginPage {
            url: "https://secure.indeed.com/auth".to_string(),
            email: spec(
                "email field",
                css(&["input[type='email']", "input[name='__email']"]),
            ),
            password: spec(
                "password field",
                css(&["input[type='password']", "input[name='__password']"]),
            ),
            continue_button: spec(
                "continue button",
                vec![
                    Strategy::css("button[data-tn-element='auth-page-email-submit-button']"),
                    Strategy::css("button[type='submit']"),
                ],
            ),
            submit: spec(
                "sign-in button",
                vec![
                    Strategy::css(
                        "button[data-tn-element='auth-page-sign-in-password-form-submit-button']",
                    ),
                    Strategy::css("button[type='submit']"),
                ],
            ),
        }),

        job_cards: spec("job card", css(&[".job_seen_beacon", "[data-jk]"])),
        card_title: spec("card title", css(&["h2.jobTitle", ".jobTitle"])),
        card_company: spec(
            "card company",
            css(&["[data-testid='company-name']", ".companyName"]),
        ),
        card_location: spec(
            "card location",
            css(&["[data-testid='text-location']", ".companyLocation"]),
        ),
        card_link: spec("card link", css(&["h2.jobTitle a", "a.jcs-JobTitle"])),

        detail_title: spec(
            "job title",
            css(&[
                "[data-testid='jobsearch-JobInfoHeader-title']",
                "h1.jobsearch-JobInfoHeader-title",
                "h1",
            ]),
        ),
        detail_company: spec(
            "company name",
            css(&["[data-testid='inlineHeader-companyName']", "[data-company-name='true']"]),
        ),
        detail_description: spec("job description", css(&["#jobDescriptionText"])),

        apply: spec(
            "apply button",
            vec![
                Strategy::css("#indeedApplyButton"),
                Strategy::css(".jobsearch-IndeedApplyButton-newDesign"),
                Strategy::xpath("//button[contains(., 'Apply now')]"),
            ],
        )
        .containing("apply"),
        submit: spec(
            "submit button",
            vec![
                Strategy::xpath("//button[contains(., 'Submit your application')]"),
                Strategy::css("button[data-testid*='submit']"),
            ],
        ),
        next: spec(
            "continue button",
            vec![
                Strategy::css(".ia-continueButton"),
                Strategy::xpath("//button[contains(., 'Continue') or contains(., 'Review')]"),
            ],
        ),
        dismiss: spec(
            "close button",
            css(&["button[aria-label='Close']", "button[aria-label='close']"]),
        ),
        next_page: spec(
            "next results page",
            css(&["a[data-testid='pagination-page-next']", "a[aria-label='Next Page']"]),
        ),
        form_fields: spec(
            "form field",
            css(&[
                ".ia-BasePage input, .ia-BasePage textarea, .ia-BasePage select",
                "form input, form textarea, form select",
            ]),
        ),
    }
}
