// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead qualification and upsert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use dealerline_core::types::{Lead, LeadSubmission, Priority};
use dealerline_core::{DealerlineError, StorageAdapter};

/// Minimum digits for a phone number to count as reachable.
const MIN_PHONE_DIGITS: usize = 10;

const PHONE_POINTS: u32 = 50;
const EMAIL_POINTS: u32 = 20;
const INTEREST_POINTS: u32 = 20;
const SOURCE_POINTS: u32 = 5;

const HOT_THRESHOLD: u32 = 80;
const WARM_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qualification {
    pub score: u32,
    pub priority: Priority,
}

/// Scores a lead from the fields it carries. Pure.
pub fn qualify(lead: &Lead) -> Qualification {
    let mut score = 0;
    if lead
        .phone
        .as_deref()
        .is_some_and(|p| p.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS)
    {
        score += PHONE_POINTS;
    }
    if present(&lead.email) {
        score += EMAIL_POINTS;
    }
    if present(&lead.interest) {
        score += INTEREST_POINTS;
    }
    if present(&lead.attribution.source) {
        score += SOURCE_POINTS;
    }

    Qualification {
        score,
        priority: priority_for(score),
    }
}

pub fn priority_for(score: u32) -> Priority {
    if score >= HOT_THRESHOLD {
        Priority::Hot
    } else if score >= WARM_THRESHOLD {
        Priority::Warm
    } else {
        Priority::Cold
    }
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Qualifies submissions and upserts them by phone.
pub struct LeadService {
    storage: Arc<dyn StorageAdapter>,
}

impl LeadService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Normalizes, merges with any lead sharing the phone, requalifies and saves.
    ///
    /// A resubmission keeps the existing id and creation time; fields absent
    /// from the new submission keep their stored values.
    pub async fn upsert(&self, submission: LeadSubmission) -> Result<Lead, DealerlineError> {
        let submission = submission.normalized();
        if submission.phone.is_none() && submission.email.is_none() {
            return Err(DealerlineError::Validation(
                "lead requires a phone or email".into(),
            ));
        }

        let now = Utc::now();
        let candidate = requalified(
            Lead {
                id: uuid::Uuid::new_v4().to_string(),
                name: submission.name.clone(),
                phone: submission.phone.clone(),
                email: submission.email.clone(),
                interest: submission.interest.clone(),
                attribution: submission.attribution.clone(),
                score: 0,
                priority: Priority::Cold,
                created_at: now,
                updated_at: now,
            },
            now,
        );

        let lead = if candidate.phone.is_some() {
            self.storage
                .upsert_lead_by_phone(
                    candidate,
                    Box::new(move |current| requalified(merge(current, submission), now)),
                )
                .await?
        } else {
            self.storage.save_lead(&candidate).await?;
            candidate
        };

        info!(
            lead_id = lead.id.as_str(),
            score = lead.score,
            priority = %lead.priority,
            "lead qualified"
        );
        Ok(lead)
    }
}

fn requalified(mut lead: Lead, now: DateTime<Utc>) -> Lead {
    let qualification = qualify(&lead);
    lead.score = qualification.score;
    lead.priority = qualification.priority;
    lead.updated_at = now;
    lead
}

fn merge(mut current: Lead, update: LeadSubmission) -> Lead {
    current.name = update.name.or(current.name);
    current.phone = update.phone.or(current.phone);
    current.email = update.email.or(current.email);
    current.interest = update.interest.or(current.interest);

    let attribution = &mut current.attribution;
    let incoming = update.attribution;
    attribution.source = incoming.source.or(attribution.source.take());
    attribution.medium = incoming.medium.or(attribution.medium.take());
    attribution.campaign = incoming.campaign.or(attribution.campaign.take());
    attribution.content = incoming.content.or(attribution.content.take());
    attribution.term = incoming.term.or(attribution.term.take());
    attribution.click_id = incoming.click_id.or(attribution.click_id.take());
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerline_core::types::Attribution;
    use dealerline_test_utils::MemoryStorage;
    use proptest::prelude::*;

    fn lead(
        phone: Option<&str>,
        email: Option<&str>,
        interest: Option<&str>,
        source: Option<&str>,
    ) -> Lead {
        let now = Utc::now();
        Lead {
            id: "lead-1".into(),
            name: None,
            phone: phone.map(String::from),
            email: email.map(String::from),
            interest: interest.map(String::from),
            attribution: Attribution {
                source: source.map(String::from),
                ..Attribution::default()
            },
            score: 0,
            priority: Priority::Cold,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_contact_without_source_is_hot() {
        let q = qualify(&lead(
            Some("5585999999999"),
            Some("ana@example.com"),
            Some("Corolla 2024"),
            None,
        ));
        assert_eq!(q.score, 90);
        assert_eq!(q.priority, Priority::Hot);
    }

    #[test]
    fn phone_only_is_warm() {
        let q = qualify(&lead(Some("8599999999"), None, None, None));
        assert_eq!(q.score, 50);
        assert_eq!(q.priority, Priority::Warm);
    }

    #[test]
    fn empty_lead_is_cold() {
        let q = qualify(&lead(None, None, None, None));
        assert_eq!(q.score, 0);
        assert_eq!(q.priority, Priority::Cold);
    }

    #[test]
    fn short_phone_scores_nothing() {
        let q = qualify(&lead(Some("999999"), None, None, Some("instagram")));
        assert_eq!(q.score, 5);
        assert_eq!(q.priority, Priority::Cold);
    }

    proptest! {
        #[test]
        fn score_is_the_sum_of_present_fields(
            phone in proptest::option::of("[0-9]{0,14}"),
            email in proptest::option::of("[a-z]{0,6}"),
            interest in proptest::option::of("[a-z ]{0,8}"),
            source in proptest::option::of("[a-z]{0,6}"),
        ) {
            let l = lead(phone.as_deref(), email.as_deref(), interest.as_deref(), source.as_deref());
            let q = qualify(&l);

            let mut expected = 0;
            if phone.as_ref().is_some_and(|p| p.len() >= 10) { expected += 50; }
            if email.as_ref().is_some_and(|e| !e.trim().is_empty()) { expected += 20; }
            if interest.as_ref().is_some_and(|i| !i.trim().is_empty()) { expected += 20; }
            if source.as_ref().is_some_and(|s| !s.trim().is_empty()) { expected += 5; }

            prop_assert_eq!(q.score, expected);
            prop_assert!(q.score <= 95);
            prop_assert_eq!(q.priority, priority_for(expected));
        }

        #[test]
        fn priority_is_monotonic(a in 0u32..=95, b in 0u32..=95) {
            let rank = |p: Priority| match p { Priority::Cold => 0, Priority::Warm => 1, Priority::Hot => 2 };
            if a <= b {
                prop_assert!(rank(priority_for(a)) <= rank(priority_for(b)));
            }
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_merges_by_phone() {
        let storage = Arc::new(MemoryStorage::new());
        let service = LeadService::new(storage.clone());

        let first = service
            .upsert(LeadSubmission {
                name: Some("Ana".into()),
                phone: Some("+55 (85) 99999-9999".into()),
                ..LeadSubmission::default()
            })
            .await
            .unwrap();
        assert_eq!(first.phone.as_deref(), Some("5585999999999"));
        assert_eq!(first.priority, Priority::Warm);

        let second = service
            .upsert(LeadSubmission {
                phone: Some("5585999999999".into()),
                email: Some("ana@example.com".into()),
                interest: Some("SUV".into()),
                ..LeadSubmission::default()
            })
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.name.as_deref(), Some("Ana"));
        assert_eq!(second.score, 90);
        assert_eq!(second.priority, Priority::Hot);
        assert_eq!(storage.lead_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_phone_create_one_lead() {
        let storage = Arc::new(MemoryStorage::new());
        let service = Arc::new(LeadService::new(storage.clone()));

        let from_form = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .upsert(LeadSubmission {
                        phone: Some("5585977776666".into()),
                        email: Some("rui@example.com".into()),
                        ..LeadSubmission::default()
                    })
                    .await
            })
        };
        let from_chat = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .upsert(LeadSubmission {
                        phone: Some("+55 85 97777-6666".into()),
                        interest: Some("Onix".into()),
                        ..LeadSubmission::default()
                    })
                    .await
            })
        };

        let a = from_form.await.unwrap().unwrap();
        let b = from_chat.await.unwrap().unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(storage.lead_count().await, 1);

        let stored = storage.get_lead(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("rui@example.com"));
        assert_eq!(stored.interest.as_deref(), Some("Onix"));
        assert_eq!(stored.score, 90);
    }

    #[tokio::test]
    async fn upsert_rejects_leads_without_contact() {
        let service = LeadService::new(Arc::new(MemoryStorage::new()));
        let err = service
            .upsert(LeadSubmission {
                name: Some("  ".into()),
                phone: Some("abc".into()),
                ..LeadSubmission::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DealerlineError::Validation(_)));
    }
}
