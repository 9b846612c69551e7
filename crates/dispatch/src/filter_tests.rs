// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

fn assignment(department: &str, languages: &[&str]) -> Assignment {
    let mut a = Assignment::pending("room", department);
    a.languages = languages.iter().map(|l| (*l).to_owned()).collect();
    a
}

#[yare::parameterized(
    same_dept_no_langs    = { "support", &[], "support", &["en"], true },
    subset                = { "support", &["en"], "support", &["en", "fr"], true },
    exact                 = { "support", &["en", "fr"], "support", &["fr", "en"], true },
    missing_language      = { "support", &["de"], "support", &["en", "fr"], false },
    other_department      = { "billing", &[], "support", &["en"], false },
    department_is_exact   = { "Support", &[], "support", &[], false },
    empty_event_languages = { "support", &["en"], "support", &[], false },
)]
fn matches_table(
    filter_dept: &str,
    filter_langs: &[&str],
    event_dept: &str,
    event_langs: &[&str],
    expected: bool,
) {
    let filter = SubscriptionFilter::new(filter_dept, filter_langs);
    assert_eq!(filter.matches(&assignment(event_dept, event_langs)), expected);
}

#[test]
fn credit_card_subscriber_ignores_customer_service() {
    let event = assignment("customer-service", &["en"]);
    assert!(!SubscriptionFilter::new("credit-card", &["en"]).matches(&event));
    assert!(SubscriptionFilter::new("customer-service", &["en"]).matches(&event));
}

#[yare::parameterized(
    simple      = { "support", "en,fr", &["en", "fr"] },
    spaces      = { " support ", " en , fr ", &["en", "fr"] },
    empty       = { "support", "", &[] },
    stray_comma = { "support", "en,,", &["en"] },
)]
fn from_query(department: &str, languages: &str, expected: &[&str]) {
    let filter = SubscriptionFilter::from_query(department, languages);
    assert_eq!(filter.department, "support");
    assert_eq!(filter.languages, expected);
}

fn language() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["en", "es", "fr", "de", "ja", "pt"]).prop_map(str::to_owned)
}

proptest! {
    /// Any subset of the event's languages matches; adding a language the
    /// event lacks never does.
    #[test]
    fn subset_law(
        event_langs in prop::collection::vec(language(), 0..6),
        pick in prop::collection::vec(any::<bool>(), 6),
        extra in language(),
    ) {
        let mut event = assignment("support", &[]);
        event.languages = event_langs.clone();

        let subset: Vec<String> = event_langs
            .iter()
            .zip(pick.iter())
            .filter(|(_, keep)| **keep)
            .map(|(l, _)| l.clone())
            .collect();
        let filter = SubscriptionFilter { department: "support".into(), languages: subset.clone() };
        prop_assert!(filter.matches(&event));

        let mut superset = subset;
        superset.push(extra.clone());
        let filter = SubscriptionFilter { department: "support".into(), languages: superset };
        prop_assert_eq!(filter.matches(&event), event_langs.contains(&extra));
    }

    /// The department check is independent of the language check.
    #[test]
    fn department_gates_everything(dept in "[a-z]{1,8}", langs in prop::collection::vec(language(), 0..4)) {
        let mut event = assignment("support", &[]);
        event.languages = langs.clone();
        let filter = SubscriptionFilter { department: dept.clone(), languages: Vec::new() };
        prop_assert_eq!(filter.matches(&event), dept == "support");
    }
}
