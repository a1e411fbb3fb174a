// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    pub struct TestId("tst-");
}

#[test]
fn new_ids_carry_the_prefix_and_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert!(a.as_str().starts_with("tst-"));
    assert_ne!(a.as_str(), b.as_str());
}

#[test]
fn from_string_round_trips() {
    let id = TestId::from_string("tst-fixed");
    assert_eq!(id.as_str(), "tst-fixed");
    assert_eq!(id, *"tst-fixed");
}

#[test]
fn display_matches_as_str() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id.to_string(), "tst-abc");
}
