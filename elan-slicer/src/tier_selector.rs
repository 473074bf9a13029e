use crate::annotation_source::AnnotationDocument;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("there is no tier named '{name}'")]
    NotFound { name: String },
    #[error("tier index {index} is out of range, the document has {count} tier(s) numbered from 1")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Picks the tier to slice. A name wins over the index and is used as is, whether it
/// exists is checked when its annotations are looked up. The index counts from 1.
pub fn resolve(
    document: &AnnotationDocument,
    tier_name: Option<&str>,
    tier_index: usize,
) -> Result<String, TierError> {
    if let Some(name) = tier_name {
        return Ok(name.to_string());
    }

    let count = document.tier_count();
    let out_of_range = TierError::IndexOutOfRange {
        index: tier_index,
        count,
    };
    let Some(zero_based) = tier_index.checked_sub(1) else {
        return Err(out_of_range);
    };
    if zero_based >= count {
        return Err(out_of_range);
    }

    document
        .tier_names()
        .nth(zero_based)
        .map(str::to_string)
        .ok_or(out_of_range)
}
