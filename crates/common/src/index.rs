//! Name indexes over loaded documents

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::types::Sequence;

/// Fail with every name that occurs more than once
pub fn assert_unique_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    kind: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            duplicates.insert(name.to_string());
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(Error::DuplicateName {
            kind: kind.to_string(),
            names: duplicates.into_iter().collect(),
        })
    }
}

pub fn build_sequence_index(sequences: Vec<Sequence>) -> Result<HashMap<String, Sequence>> {
    assert_unique_names(sequences.iter().map(|s| s.name.as_str()), "sequences")?;
    Ok(sequences.into_iter().map(|s| (s.name.clone(), s)).collect())
}
