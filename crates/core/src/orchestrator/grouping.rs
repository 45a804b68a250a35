//! Bracket grouping: which brackets merge into which HDR image.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::order::Bracket;

/// Named grouping strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// One image per upload request (brackets sharing `metadata.group_id`).
    #[default]
    ByUploadGroup,
    /// Fixed-size sequential chunks.
    Auto,
    /// Everything in one image.
    All,
    /// One image per bracket.
    Individual,
}

/// A strategy name or an explicit list of provider bracket id groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BracketGrouping {
    Strategy(GroupingStrategy),
    Explicit(Vec<Vec<String>>),
}

impl Default for BracketGrouping {
    fn default() -> Self {
        BracketGrouping::Strategy(GroupingStrategy::default())
    }
}

impl BracketGrouping {
    pub fn label(&self) -> &'static str {
        match self {
            BracketGrouping::Strategy(GroupingStrategy::ByUploadGroup) => "by_upload_group",
            BracketGrouping::Strategy(GroupingStrategy::Auto) => "auto",
            BracketGrouping::Strategy(GroupingStrategy::All) => "all",
            BracketGrouping::Strategy(GroupingStrategy::Individual) => "individual",
            BracketGrouping::Explicit(_) => "explicit",
        }
    }
}

/// Split brackets into image groups of provider bracket ids.
///
/// Input order is preserved inside and across groups. `per_image` is only
/// used by `auto` and the fallbacks that land there.
pub fn group_brackets(
    brackets: &[Bracket],
    grouping: &BracketGrouping,
    per_image: usize,
) -> Vec<Vec<String>> {
    match grouping {
        BracketGrouping::Strategy(GroupingStrategy::ByUploadGroup) => {
            let groups = by_upload_group(brackets, per_image);
            if groups.is_empty() {
                auto(brackets, per_image)
            } else {
                groups
            }
        }
        BracketGrouping::Strategy(GroupingStrategy::Auto) => auto(brackets, per_image),
        BracketGrouping::Strategy(GroupingStrategy::All) => {
            if brackets.is_empty() {
                Vec::new()
            } else {
                vec![ids(brackets.iter())]
            }
        }
        BracketGrouping::Strategy(GroupingStrategy::Individual) => brackets
            .iter()
            .map(|b| vec![b.bracket_id.clone()])
            .collect(),
        BracketGrouping::Explicit(requested) => {
            let known: HashSet<&str> = brackets.iter().map(|b| b.bracket_id.as_str()).collect();
            let groups: Vec<Vec<String>> = requested
                .iter()
                .filter(|group| {
                    !group.is_empty() && group.iter().all(|id| known.contains(id.as_str()))
                })
                .cloned()
                .collect();
            if groups.is_empty() {
                auto(brackets, per_image)
            } else {
                groups
            }
        }
    }
}

fn ids<'a>(brackets: impl Iterator<Item = &'a Bracket>) -> Vec<String> {
    brackets.map(|b| b.bracket_id.clone()).collect()
}

fn auto(brackets: &[Bracket], per_image: usize) -> Vec<Vec<String>> {
    brackets
        .chunks(per_image.max(1))
        .map(|chunk| ids(chunk.iter()))
        .collect()
}

fn by_upload_group(brackets: &[Bracket], per_image: usize) -> Vec<Vec<String>> {
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    let mut ungrouped: Vec<Bracket> = Vec::new();

    for bracket in brackets {
        match bracket.group_id() {
            Some(group_id) => match groups.iter_mut().find(|(g, _)| *g == group_id) {
                Some((_, members)) => members.push(bracket.bracket_id.clone()),
                None => groups.push((group_id, vec![bracket.bracket_id.clone()])),
            },
            None => ungrouped.push(bracket.clone()),
        }
    }

    let mut result: Vec<Vec<String>> = groups.into_iter().map(|(_, members)| members).collect();
    result.extend(auto(&ungrouped, per_image));
    result
}
