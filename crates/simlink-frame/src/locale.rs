//! Repair of comma decimal separators.
//!
//! A simulator running under a French or German locale formats floats as
//! `1,5` instead of `1.5`, which turns `"cte":1,5,` into invalid JSON. The
//! repair only touches a numeric run that directly follows a `"key":` and is
//! terminated by the field separator or the closing brace, so array
//! separators and string contents are left alone.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn field_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?P<key>"[A-Za-z_][A-Za-z0-9_]*":\s*)(?P<num>[0-9,E-]+)(?P<end>[,}])"#)
            .expect("field number pattern is a valid regex")
    })
}

/// Rewrite comma-decimal numbers in `"key":<number>` fields to dot-decimal.
///
/// Returns the input unchanged (borrowed) when nothing matches.
///
/// ```
/// use simlink_frame::fix_locale_floats;
///
/// assert_eq!(fix_locale_floats(r#"{"cte":1,5,"speed":2}"#), r#"{"cte":1.5,"speed":2}"#);
/// assert_eq!(fix_locale_floats(r#"{"pos":[1,2]}"#), r#"{"pos":[1,2]}"#);
/// ```
pub fn fix_locale_floats(text: &str) -> Cow<'_, str> {
    if !text.contains(',') {
        return Cow::Borrowed(text);
    }

    field_number().replace_all(text, |caps: &Captures<'_>| {
        format!(
            "{}{}{}",
            &caps["key"],
            caps["num"].replace(',', "."),
            &caps["end"]
        )
    })
}
