//! Unique-value transform
//!
//! Wraps a candidate generator and guarantees that, for one transform instance,
//! no value is ever issued twice. A colliding candidate is disambiguated with an
//! increasing suffix until it is unused.

use super::Transform;
use crate::domain::FieldValue;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

/// Identifier of the built-in unique e-mail transform
pub const UNIQUE_EMAIL_ID: &str = "unique_email";

/// Source of candidate values for [`UniqueValueTransform`]
pub trait CandidateGenerator: Send {
    /// Produces the next candidate; may repeat earlier values
    fn candidate(&mut self) -> String;

    /// Variant of `candidate` for the given attempt (1, 2, ...)
    fn disambiguate(&self, candidate: &str, attempt: u64) -> String {
        format!("{candidate}{attempt}")
    }
}

/// Fake e-mail addresses on reserved example domains
pub struct EmailGenerator {
    rng: StdRng,
}

impl EmailGenerator {
    /// Seeded generator; `None` seeds from system entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl CandidateGenerator for EmailGenerator {
    fn candidate(&mut self) -> String {
        SafeEmail().fake_with_rng(&mut self.rng)
    }

    /// `jane@example.org` → `jane+2@example.org`
    fn disambiguate(&self, candidate: &str, attempt: u64) -> String {
        match candidate.split_once('@') {
            Some((local, domain)) => format!("{local}+{attempt}@{domain}"),
            None => format!("{candidate}{attempt}"),
        }
    }
}

/// Issues pairwise distinct values for the lifetime of a run
pub struct UniqueValueTransform<G: CandidateGenerator> {
    id: String,
    generator: G,
    issued: HashSet<String>,
    /// First suffix still worth trying for each colliding candidate
    next_attempt: HashMap<String, u64>,
    collisions: u64,
}

impl<G: CandidateGenerator> UniqueValueTransform<G> {
    pub fn new(id: impl Into<String>, generator: G) -> Self {
        Self {
            id: id.into(),
            generator,
            issued: HashSet::new(),
            next_attempt: HashMap::new(),
            collisions: 0,
        }
    }

    /// Candidates that had to be disambiguated so far
    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    /// Values issued so far
    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    fn next_unique(&mut self) -> String {
        let candidate = self.generator.candidate();
        if self.issued.insert(candidate.clone()) {
            return candidate;
        }

        self.collisions += 1;
        let mut attempt = self.next_attempt.get(&candidate).copied().unwrap_or(1);
        loop {
            let value = self.generator.disambiguate(&candidate, attempt);
            if self.issued.insert(value.clone()) {
                tracing::trace!(transform = %self.id, attempt, "Disambiguated colliding value");
                self.next_attempt.insert(candidate, attempt + 1);
                return value;
            }
            attempt += 1;
        }
    }
}

impl UniqueValueTransform<EmailGenerator> {
    /// The built-in `unique_email` transform
    pub fn email(seed: Option<u64>) -> Self {
        Self::new(UNIQUE_EMAIL_ID, EmailGenerator::new(seed))
    }
}

impl<G: CandidateGenerator> Transform for UniqueValueTransform<G> {
    fn id(&self) -> &str {
        &self.id
    }

    fn transform(&mut self, _value: FieldValue) -> FieldValue {
        FieldValue::Text(self.next_unique())
    }

    fn reset(&mut self) {
        self.issued.clear();
        self.next_attempt.clear();
        self.collisions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cycles through a fixed pool so collisions are guaranteed
    struct PoolGenerator {
        pool: Vec<&'static str>,
        next: usize,
    }

    impl CandidateGenerator for PoolGenerator {
        fn candidate(&mut self) -> String {
            let value = self.pool[self.next % self.pool.len()];
            self.next += 1;
            value.to_string()
        }
    }

    #[test]
    fn test_emails_are_distinct() {
        let mut transform = UniqueValueTransform::email(Some(42));
        let mut seen = HashSet::new();
        for i in 0..500 {
            let value = transform.transform(FieldValue::from(format!("user{i}@corp.com")));
            let email = value.as_text().unwrap().to_string();
            assert!(email.contains('@'));
            assert!(seen.insert(email));
        }
        assert_eq!(transform.issued_count(), 500);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let mut a = UniqueValueTransform::email(Some(7));
        let mut b = UniqueValueTransform::email(Some(7));
        for _ in 0..20 {
            assert_eq!(
                a.transform(FieldValue::Null),
                b.transform(FieldValue::Null)
            );
        }
    }

    #[test]
    fn test_collision_retry_path() {
        let generator = PoolGenerator {
            pool: vec!["a@example.com", "b@example.com"],
            next: 0,
        };
        let mut transform = UniqueValueTransform::new("tiny", generator);
        let values: HashSet<String> = (0..10)
            .map(|_| transform.transform(FieldValue::Null).to_string())
            .collect();

        assert_eq!(values.len(), 10);
        assert_eq!(transform.collisions(), 8);
    }

    #[test]
    fn test_email_disambiguation_keeps_domain() {
        let generator = EmailGenerator::new(Some(1));
        assert_eq!(
            generator.disambiguate("jane@example.org", 3),
            "jane+3@example.org"
        );
        assert_eq!(generator.disambiguate("no-at-sign", 2), "no-at-sign2");
    }

    #[test]
    fn test_suffixed_values_never_reissued() {
        struct Fixed;
        impl CandidateGenerator for Fixed {
            fn candidate(&mut self) -> String {
                "x".to_string()
            }
        }

        let mut transform = UniqueValueTransform::new("fixed", Fixed);
        let first: Vec<_> = (0..4).map(|_| transform.transform(FieldValue::Null)).collect();
        assert_eq!(
            first,
            vec![
                FieldValue::from("x"),
                FieldValue::from("x1"),
                FieldValue::from("x2"),
                FieldValue::from("x3"),
            ]
        );
    }

    #[test]
    fn test_collisions_resume_from_last_suffix() {
        use std::sync::atomic::{AtomicU64, Ordering};

        struct Counting(AtomicU64);
        impl CandidateGenerator for Counting {
            fn candidate(&mut self) -> String {
                "x".to_string()
            }

            fn disambiguate(&self, candidate: &str, attempt: u64) -> String {
                self.0.fetch_add(1, Ordering::Relaxed);
                format!("{candidate}{attempt}")
            }
        }

        let mut transform = UniqueValueTransform::new("fixed", Counting(AtomicU64::new(0)));
        for _ in 0..1000 {
            transform.transform(FieldValue::Null);
        }

        assert_eq!(transform.issued_count(), 1000);
        assert_eq!(transform.collisions(), 999);
        assert_eq!(transform.generator.0.load(Ordering::Relaxed), 999);
    }

    #[test]
    fn test_suffix_skips_values_issued_directly() {
        let generator = PoolGenerator {
            pool: vec!["a", "a1", "a", "a"],
            next: 0,
        };
        let mut transform = UniqueValueTransform::new("pool", generator);
        let values: Vec<_> = (0..4).map(|_| transform.transform(FieldValue::Null)).collect();
        assert_eq!(
            values,
            vec![
                FieldValue::from("a"),
                FieldValue::from("a1"),
                FieldValue::from("a2"),
                FieldValue::from("a3"),
            ]
        );
    }

    #[test]
    fn test_reset_forgets_issued_values() {
        struct Fixed;
        impl CandidateGenerator for Fixed {
            fn candidate(&mut self) -> String {
                "same".to_string()
            }
        }

        let mut transform = UniqueValueTransform::new("fixed", Fixed);
        transform.transform(FieldValue::Null);
        transform.transform(FieldValue::Null);
        assert_eq!(transform.collisions(), 1);

        transform.reset();
        assert_eq!(transform.collisions(), 0);
        assert_eq!(transform.transform(FieldValue::Null), FieldValue::from("same"));
    }
}
