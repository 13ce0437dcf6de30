// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::reconcilers::finalizers::{with_finalizer, without_finalizer};

    const TEST_FINALIZER: &str = "cluster-agent.io/config-in-use";

    #[test]
    fn test_with_finalizer_appends_once() {
        let existing = vec!["other.io/keep".to_string()];
        assert_eq!(
            with_finalizer(&existing, TEST_FINALIZER),
            Some(vec![
                "other.io/keep".to_string(),
                TEST_FINALIZER.to_string()
            ])
        );

        let present = vec![TEST_FINALIZER.to_string()];
        assert_eq!(with_finalizer(&present, TEST_FINALIZER), None);
    }

    #[test]
    fn test_without_finalizer_keeps_foreign_finalizers() {
        let existing = vec![TEST_FINALIZER.to_string(), "other.io/keep".to_string()];
        assert_eq!(
            without_finalizer(&existing, TEST_FINALIZER),
            Some(vec!["other.io/keep".to_string()])
        );
        assert_eq!(without_finalizer(&[], TEST_FINALIZER), None);
    }
}
