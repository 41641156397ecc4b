//! Prompt taxonomy classification.
//!
//! Bulk prompt sheets describe one mascot in a fixed taxonomy: a chest
//! emblem (SUI / Gem / Tree / Star), cape or no cape, and optional
//! arborist gear. Classification maps each prompt into one of twelve
//! groups from those three axes, flagging prompts that are missing an
//! emblem or match several.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Chest emblem families, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmblemKind {
    Sui,
    Gem,
    Tree,
    Star,
}

impl EmblemKind {
    pub fn label(&self) -> &'static str {
        match self {
            EmblemKind::Sui => "SUI",
            EmblemKind::Gem => "Gem",
            EmblemKind::Tree => "Tree",
            EmblemKind::Star => "Star",
        }
    }
}

/// One classified prompt. Field names are the wire contract the gallery
/// frontend expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedPrompt {
    pub group: u32,
    pub number: String,
    pub variants: String,
    pub prompt: String,
    pub chest_type: String,
    pub cape: String,
    pub arborist: String,
    pub is_valid: bool,
    pub validation_notes: String,
}

/// Compiled detection rules for the prompt taxonomy.
pub struct PromptClassifier {
    emblem_rules: Vec<(EmblemKind, Vec<Regex>)>,
    no_cape_rules: Vec<Regex>,
    arborist_rules: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

impl PromptClassifier {
    pub fn new() -> Self {
        let emblem_rules = vec![
            (
                EmblemKind::Sui,
                compile(&[
                    r"\bsui\s+logo\b",
                    r"\bsui\b",
                    r"\bdroplet[- ]shaped\b.*\bemblem\b",
                    r"\bs[- ]curve\b.*\bemblem\b",
                    r"\bdroplet\b.*\blogo\b",
                    r"\bsui\s+emblem\b",
                    r"\bsui\s+symbol\b",
                ]),
            ),
            (
                EmblemKind::Gem,
                compile(&[
                    r"\bcrystal\s+gem\b",
                    r"\bfaceted\s+gem\b",
                    r"\bfractured\s+gem\b",
                    r"\bcrystal\s+emblem\b",
                    r"\bgem\s+emblem\b",
                    r"\bcrystalline\b.*\bchest\b",
                    r"\bfaceted\s+crystal\b",
                    r"\bgem\b.*\bchest\b",
                    r"\bchest\b.*\bgem\b",
                ]),
            ),
            (
                EmblemKind::Tree,
                compile(&[
                    r"\btree[- ]of[- ]life\b",
                    r"\broot\s+pattern\b",
                    r"\broots\b.*\bemblem\b",
                    r"\boak\b.*\bemblem\b",
                    r"\bpine\b.*\bemblem\b",
                    r"\btrunk\s+cross[- ]section\b",
                    r"\btree\s+emblem\b",
                    r"\broot\s+emblem\b",
                    r"\barboreal\b.*\bchest\b",
                ]),
            ),
            (
                EmblemKind::Star,
                compile(&[
                    r"\bgolden\s+star\b",
                    r"\bfive[- ]pointed\s+star\b",
                    r"\bstar\s+emblem\b",
                    r"\b5[- ]pointed\s+star\b",
                    r"\bgold\s+star\b.*\bchest\b",
                    r"\bstar\b.*\bchest\b",
                    r"\bchest\b.*\bstar\b",
                ]),
            ),
        ];

        let no_cape_rules = compile(&[
            r"\bno\s+cape\b",
            r"\bwearing\s+no\s+cape\b",
            r"\bwithout\s+cape\b",
            r"\bcapeless\b",
            r"\bno\s+cloak\b",
        ]);

        let arborist_rules = compile(&[
            r"\barborist\s+gear\b",
            r"\barborist\b",
            r"\bhelmet\b.*\brope\s+harness\b",
            r"\brope\s+harness\b.*\bhelmet\b",
            r"\bclimbing\s+gear\b",
            r"\btree\s+climber\b",
            r"\bhelmet\s+and\s+harness\b",
            r"\bharness\s+and\s+helmet\b",
        ]);

        Self {
            emblem_rules,
            no_cape_rules,
            arborist_rules,
        }
    }

    /// All emblem families matched by the prompt, in detection order.
    fn detect_emblems(&self, prompt: &str) -> Vec<EmblemKind> {
        self.emblem_rules
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(prompt)))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Cape presence. Only an explicit "no cape" flips the default; the
    /// sheet conventions treat an unspecified cape as present.
    fn detect_cape(&self, prompt: &str) -> bool {
        !self.no_cape_rules.iter().any(|p| p.is_match(prompt))
    }

    fn detect_arborist(&self, prompt: &str) -> bool {
        self.arborist_rules.iter().any(|p| p.is_match(prompt))
    }

    /// Classify one prompt into its taxonomy group.
    pub fn classify(&self, number: &str, prompt: &str) -> ClassifiedPrompt {
        let lower = prompt.to_lowercase();
        let emblems = self.detect_emblems(&lower);
        let mut cape = self.detect_cape(&lower);
        let arborist = self.detect_arborist(&lower);

        let mut is_valid = true;
        let mut notes: Vec<String> = Vec::new();

        let emblem = match emblems.as_slice() {
            [] => {
                is_valid = false;
                notes.push("Missing chest emblem".to_string());
                None
            }
            [single] => Some(*single),
            several => {
                is_valid = false;
                let labels: Vec<&str> = several.iter().map(|e| e.label()).collect();
                notes.push(format!(
                    "Multiple chest emblems detected: {}",
                    labels.join(", ")
                ));
                Some(several[0])
            }
        };

        // Arborist gear implies a cape in every defined group; normalize
        // rather than reject.
        if arborist && !cape {
            notes.push("Warning: Arborist usually implies Cape (no matching group)".to_string());
            cape = true;
        }

        let chest_label = emblem.map(|e| e.label()).unwrap_or("Unknown");
        let mut group = emblem.map(|e| group_number(e, cape, arborist)).unwrap_or(0);
        if group == 0 {
            is_valid = false;
            notes.push(format!(
                "No valid group for combination: {}/{}/{}",
                chest_label,
                cape_label(cape),
                arborist_label(arborist)
            ));
            group = 1;
        }

        ClassifiedPrompt {
            group,
            number: number.to_string(),
            variants: format!(
                "{} + {} + {}",
                chest_label,
                cape_label(cape),
                if arborist { "Arborist" } else { "Standard" }
            ),
            prompt: prompt.to_string(),
            chest_type: chest_label.to_string(),
            cape: cape_label(cape).to_string(),
            arborist: arborist_label(arborist).to_string(),
            is_valid,
            validation_notes: notes.join("; "),
        }
    }
}

impl Default for PromptClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn cape_label(cape: bool) -> &'static str {
    if cape { "Cape" } else { "No Cape" }
}

fn arborist_label(arborist: bool) -> &'static str {
    if arborist { "Yes" } else { "No" }
}

/// Map the three axes to groups 1–12: three groups per emblem family
/// (cape+arborist, cape, no cape).
fn group_number(emblem: EmblemKind, cape: bool, arborist: bool) -> u32 {
    let base = match emblem {
        EmblemKind::Sui => 0,
        EmblemKind::Gem => 3,
        EmblemKind::Tree => 6,
        EmblemKind::Star => 9,
    };
    match (cape, arborist) {
        (true, true) => base + 1,
        (true, false) => base + 2,
        (false, false) => base + 3,
        // Normalized away by the caller.
        (false, true) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PromptClassifier {
        PromptClassifier::new()
    }

    #[test]
    fn sui_cape_arborist_is_group_one() {
        let result = classifier().classify(
            "1",
            "Mascot with a SUI logo on the chest, flowing cape, wearing arborist gear",
        );
        assert_eq!(result.group, 1);
        assert_eq!(result.chest_type, "SUI");
        assert_eq!(result.cape, "Cape");
        assert_eq!(result.arborist, "Yes");
        assert!(result.is_valid);
        assert_eq!(result.variants, "SUI + Cape + Arborist");
    }

    #[test]
    fn gem_without_cape_is_group_six() {
        let result = classifier().classify("2", "Hero with a faceted gem emblem, no cape");
        assert_eq!(result.group, 6);
        assert_eq!(result.cape, "No Cape");
        assert!(result.is_valid);
    }

    #[test]
    fn star_with_cape_standard_is_group_eleven() {
        let result = classifier().classify("3", "A golden star on the chest and an emerald cape");
        assert_eq!(result.group, 11);
        assert_eq!(result.chest_type, "Star");
    }

    #[test]
    fn tree_emblem_detected_by_root_pattern() {
        let result = classifier().classify("4", "Chest shows a root pattern, silk cape");
        assert_eq!(result.chest_type, "Tree");
        assert_eq!(result.group, 8);
    }

    #[test]
    fn missing_emblem_is_invalid_with_fallback_group() {
        let result = classifier().classify("5", "A mascot with a cape and nothing else");
        assert!(!result.is_valid);
        assert_eq!(result.chest_type, "Unknown");
        assert_eq!(result.group, 1);
        assert!(result.validation_notes.contains("Missing chest emblem"));
    }

    #[test]
    fn multiple_emblems_flagged_but_first_groups() {
        let result =
            classifier().classify("6", "A SUI logo beside a crystal gem emblem, with a cape");
        assert!(!result.is_valid);
        assert!(result
            .validation_notes
            .contains("Multiple chest emblems detected: SUI, Gem"));
        // Grouped by the first match.
        assert_eq!(result.chest_type, "SUI");
        assert_eq!(result.group, 2);
    }

    #[test]
    fn arborist_without_cape_is_normalized() {
        let result = classifier().classify(
            "7",
            "Tree-of-life emblem, capeless, wearing climbing gear",
        );
        assert_eq!(result.cape, "Cape");
        assert_eq!(result.group, 7);
        assert!(result.validation_notes.contains("Arborist usually implies Cape"));
    }

    #[test]
    fn unspecified_cape_defaults_to_cape() {
        let result = classifier().classify("8", "Mascot with a sui emblem on the chest");
        assert_eq!(result.cape, "Cape");
        assert_eq!(result.group, 2);
    }

    #[test]
    fn detection_is_case_insensitive() {
        let result = classifier().classify("9", "FIVE-POINTED STAR EMBLEM, NO CAPE");
        assert_eq!(result.chest_type, "Star");
        assert_eq!(result.cape, "No Cape");
        assert_eq!(result.group, 12);
    }
}
