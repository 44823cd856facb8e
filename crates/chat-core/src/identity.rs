//! Canonical conversation identity.

/// Separator placed between the two participants of a canonical id.
///
/// Identifiers are not escaped, so a pair whose names contain `_` can in
/// principle share an id with another pair (`"a_b" + "c"` and `"a" + "b_c"`).
pub const SEPARATOR: char = '_';

/// Derive the order-independent conversation id for two participants.
///
/// The lexicographically smaller identifier comes first.
///
/// ```rust
/// use chat_core::canonical_id;
///
/// assert_eq!(canonical_id("bob", "alice"), "alice_bob");
/// assert_eq!(canonical_id("alice", "bob"), canonical_id("bob", "alice"));
/// ```
pub fn canonical_id(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}{}{}", first, SEPARATOR, second)
}
