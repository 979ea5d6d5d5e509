use anyhow::anyhow;

use crate::error::{LibError, Result};

/// Longest ENS or graph name the store accepts; matches the `VARCHAR(255)` columns.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPair {
    pub ens_name_1: String,
    pub ens_name_2: String,
}

pub fn normalize_ens_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LibError::invalid_with_code(
            "ens_name_required",
            "ENS name cannot be empty",
            anyhow!("blank ens name {:?}", raw),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LibError::invalid_with_code(
            "ens_name_too_long",
            "ENS name is too long",
            anyhow!("ens name has more than {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

/// Trims and orders an unordered pair so that `ens_name_1 < ens_name_2`.
///
/// Every write and every lookup by pair goes through here, which keeps the
/// stored order and the queried order identical.
pub fn normalize_pair(name_1: &str, name_2: &str) -> Result<NormalizedPair> {
    let first = normalize_ens_name(name_1)?;
    let second = normalize_ens_name(name_2)?;

    if first == second {
        return Err(LibError::invalid_with_code(
            "self_relationship",
            "Self-relationships are not allowed",
            anyhow!("{} cannot be related to itself", first),
        ));
    }

    let (ens_name_1, ens_name_2) = if first < second {
        (first, second)
    } else {
        (second, first)
    };
    Ok(NormalizedPair {
        ens_name_1,
        ens_name_2,
    })
}

/// Deletion accepts loose parameters; both names must be present before the
/// pair is normalized.
pub fn require_pair(name_1: Option<&str>, name_2: Option<&str>) -> Result<NormalizedPair> {
    match (name_1, name_2) {
        (Some(first), Some(second)) if !first.trim().is_empty() && !second.trim().is_empty() => {
            normalize_pair(first, second)
        }
        _ => Err(LibError::invalid_with_code(
            "ens_names_required",
            "Both ens_name_1 and ens_name_2 are required",
            anyhow!("missing ens name in {:?} / {:?}", name_1, name_2),
        )),
    }
}

pub fn normalize_graph_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LibError::invalid(
            "Graph name is required",
            anyhow!("empty graph name"),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LibError::invalid(
            "Graph name is too long",
            anyhow!("graph name has more than {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

pub fn normalize_description(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
