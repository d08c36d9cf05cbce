//! Genome identity resolution.
//!
//! Every stage names its artifacts differently: acquisition writes
//! `<accession>.fasta`, masking writes `<genome>/repeatmasker_out/<genome>.fasta.masked`,
//! and annotation keys its working directory on the genome alone. The functions
//! here derive the one identifier all three agree on.

use std::collections::HashMap;

use crate::domain::{GenomeAccession, GenomeId};
use crate::error::IdentityError;

/// Ordered suffix phases used to strip an artifact file name down to its genome.
///
/// Phases run in order over the remaining basename. Within a phase the longest
/// suffix is tried first and at most one suffix is removed.
///
/// Reserved suffixes are never stripped, but an identifier ending in one is
/// rejected. They keep the stages agreeing on a genome's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixRules {
    phases: Vec<Vec<String>>,
    reserved: Vec<String>,
}

impl SuffixRules {
    pub fn new<P, S>(phases: P) -> Self
    where
        P: IntoIterator,
        P::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phases = phases
            .into_iter()
            .map(|phase| {
                let mut suffixes: Vec<String> = phase
                    .into_iter()
                    .map(Into::into)
                    .filter(|suffix: &String| !suffix.is_empty())
                    .collect();
                suffixes.sort_by(|a, b| b.len().cmp(&a.len()));
                suffixes
            })
            .filter(|phase| !phase.is_empty())
            .collect();
        Self {
            phases,
            reserved: Vec::new(),
        }
    }

    pub fn reserving<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(
            suffixes
                .into_iter()
                .map(Into::into)
                .filter(|suffix: &String| !suffix.is_empty()),
        );
        self
    }

    /// Raw genome sequences as produced by acquisition and consumed by masking.
    ///
    /// `alpha.fna.fasta` would later come back from RepeatMasker as
    /// `alpha.fna.fasta.masked` and resolve to `alpha`, so it is refused here.
    pub fn raw_sequence() -> Self {
        Self::new([[".fasta"]]).reserving([".masked", ".fna", ".fa"])
    }

    /// RepeatMasker output, e.g. `mySpecies.fasta.masked` or `mySpecies.fna.masked`.
    pub fn masked_artifact() -> Self {
        Self::new(vec![vec![".fasta.masked", ".masked"], vec![".fna", ".fa"]])
            .reserving([".fasta"])
    }

    pub fn phases(&self) -> &[Vec<String>] {
        &self.phases
    }

    fn strip<'a>(&self, name: &'a str) -> &'a str {
        let mut remaining = name;
        for phase in &self.phases {
            if let Some(suffix) = phase.iter().find(|suffix| remaining.ends_with(suffix.as_str())) {
                remaining = &remaining[..remaining.len() - suffix.len()];
            }
        }
        remaining
    }

    fn carries_known_suffix(&self, name: &str) -> bool {
        self.phases
            .iter()
            .flatten()
            .chain(&self.reserved)
            .any(|suffix| name.ends_with(suffix.as_str()))
    }
}

pub fn resolve_from_accession(accession: &GenomeAccession) -> GenomeId {
    GenomeId::new_unchecked(accession.as_str().to_string())
}

/// Derives a genome identifier from an artifact file name.
///
/// An identifier that still ends in one of the rule suffixes after stripping is
/// rejected as ambiguous, so resolving `<id><suffix>` always yields `<id>` again.
pub fn resolve_from_artifact_name(
    file_name: &str,
    rules: &SuffixRules,
) -> Result<GenomeId, IdentityError> {
    let stripped = rules.strip(file_name);
    if stripped.is_empty() {
        return Err(IdentityError::Empty {
            source_name: file_name.to_string(),
        });
    }
    if rules.carries_known_suffix(stripped) {
        return Err(IdentityError::Ambiguous {
            id: stripped.to_string(),
            source_name: file_name.to_string(),
        });
    }
    if !is_path_safe(stripped) {
        return Err(IdentityError::UnsafeCharacters {
            id: stripped.to_string(),
        });
    }
    Ok(GenomeId::new_unchecked(stripped.to_string()))
}

fn is_path_safe(id: &str) -> bool {
    id != "."
        && id != ".."
        && !id.starts_with('-')
        && !id
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_control())
}

/// Tracks which source claimed each identifier during one batch run.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    claims: HashMap<GenomeId, String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `source` as the owner of `id`. A second claim from the same
    /// source is accepted; a claim from a different source is a collision.
    pub fn claim(&mut self, id: &GenomeId, source: &str) -> Result<(), IdentityError> {
        match self.claims.get(id) {
            Some(existing) if existing != source => Err(IdentityError::Collision {
                id: id.to_string(),
                source_name: source.to_string(),
                existing: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.claims.insert(id.clone(), source.to_string());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
