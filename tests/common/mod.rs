//! Shared fixtures for the end-to-end ingestion tests
//!
//! Papers are built with [`DocumentBuilder`] so that layouts stay readable
//! in the test source. Rule packs are written to a temporary directory and
//! loaded the same way the CLI loads them.

use paperlink::document::{DocumentBuilder, SourceDocument};
use paperlink::{PaperInput, RulePackRegistry};
use std::path::Path;
use tempfile::TempDir;

pub const PHYSICS_PACK: &str = r#"
subject: physics
version: "2024.1"
topics:
  - id: electricity
    name: Electricity
    description: Current, potential difference and resistance in electric circuits
    key_terms: [current, resistance, circuit, ammeter]
    units: [A, V, Ω]
  - id: energy
    name: Energy
    description: Energy stores and transfers, including falling objects
    key_terms: [kinetic energy]
    units: [J, kJ]
phrase_rules:
  - { pattern: "resistor", topic: electricity, weight: 3.0 }
  - { pattern: "kinetic energy", topic: energy, weight: 1.5 }
formula_rules:
  - { pattern: 'resistance\s*=\s*voltage\s*/\s*current', topic: electricity, weight: 5.0 }
"#;

pub const CHEMISTRY_PACK: &str = r#"
subject: chemistry
topics:
  - id: bonding
    name: Bonding
    key_terms: [covalent, ionic]
phrase_rules:
  - { pattern: "covalent bond", topic: bonding, weight: 2.0 }
"#;

/// Write `packs` as `<name>.yaml` files into a fresh temporary directory.
pub fn pack_dir(packs: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for (name, yaml) in packs {
        write(dir.path(), &format!("{}.yaml", name), yaml);
    }
    dir
}

pub fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write fixture");
}

/// Registry with the physics and chemistry packs, loaded from disk.
pub fn registry() -> RulePackRegistry {
    let dir = pack_dir(&[("physics", PHYSICS_PACK), ("chemistry", CHEMISTRY_PACK)]);
    RulePackRegistry::load_dir(dir.path()).expect("load packs")
}

pub fn input(paper_id: &str, paper: SourceDocument, markscheme: Option<SourceDocument>) -> PaperInput {
    PaperInput {
        paper_id: paper_id.to_string(),
        subject: "physics".to_string(),
        question_paper: paper,
        markscheme,
    }
}

/// One question, two main parts with three subparts each, one fence.
pub fn nested_parts_paper() -> SourceDocument {
    DocumentBuilder::new()
        .line("Answer ALL questions.")
        .line("2")
        .line("The diagram shows a circuit with a cell and a resistor.")
        .line("(a) The resistor has a resistance of 6 Ω.")
        .line("(i) State the unit of resistance.")
        .line("(1)")
        .line("(ii) Calculate the current when the p.d. is 12 V.")
        .line("(2)")
        .line("(iii) Explain what happens to the current if the resistance doubles.")
        .line("(2)")
        .line("(b) A second resistor is added in series.")
        .line("(i) Calculate the total resistance. (2)")
        .line("(ii) Calculate the new current. (2)")
        .line("(iii) State one use of a variable resistor. (2)")
        .line("(Total for Question 2 = 11 marks)")
        .build()
}

pub fn circuit_paper() -> SourceDocument {
    DocumentBuilder::new()
        .line("1")
        .line("A student investigates a circuit.")
        .line("(a) The current in the circuit is measured.")
        .line("(i) Name the meter used to measure current. (1)")
        .line("(ii) Calculate the current when 12 V is applied across 4.8 Ω. (2)")
        .line("(Total for Question 1 = 3 marks)")
        .build()
}

/// Listed markscheme with bare subpart markers under a standalone number.
pub fn circuit_markscheme() -> SourceDocument {
    DocumentBuilder::new()
        .line("1")
        .line_at(90.0, "(i) ammeter [B1]")
        .line_at(90.0, "(ii) I = V / R [M1] 2.5 A [A1]")
        .build()
}

/// Question 1 carries a formula rule hit, question 2 no rule evidence.
pub fn formula_and_plain_paper() -> SourceDocument {
    DocumentBuilder::new()
        .line("1")
        .line("A student sets up a circuit.")
        .line("(a) Show that resistance = voltage / current. (2)")
        .line("(Total for Question 1 = 2 marks)")
        .line("2")
        .line("A ball is dropped from a height.")
        .line("(a) Describe what happens as it falls. (2)")
        .line("(Total for Question 2 = 2 marks)")
        .build()
}
