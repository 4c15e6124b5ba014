use crate::error::Result;
use crate::model::{FieldKind, FieldTarget, VerificationOutcome};
use crate::page::PageDriver;

/// Lowercase and collapse runs of whitespace
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Match policy of a field kind.
///
/// Autocomplete fields accept any observed value containing the expected text,
/// since the site may expand it. Plain fields need the exact trimmed value.
pub fn matches(kind: FieldKind, expected: &str, observed: &str) -> bool {
    match kind {
        FieldKind::Autocomplete => {
            let expected = normalize(expected);
            !expected.is_empty() && normalize(observed).contains(&expected)
        }
        FieldKind::PlainNumeric => expected.trim() == observed.trim(),
    }
}

/// Re-read the field and judge it against the target
pub async fn verify<P: PageDriver + ?Sized>(
    page: &mut P,
    target: &FieldTarget,
    attempt: u32,
) -> Result<VerificationOutcome> {
    let observed_value = page.read_value(target.selector()).await?;
    Ok(VerificationOutcome {
        matched: matches(target.kind(), target.expected(), &observed_value),
        observed_value,
        attempt,
    })
}
