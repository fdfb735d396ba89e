//! Built-in personas.
//!
//! Each persona is a system instruction preset. The table is fixed at build
//! time; selecting a persona is the only way to change the active instruction.

use serde::Serialize;

pub const DEFAULT_PERSONA: &str = "legal_pro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub key: &'static str,
    pub display_name: &'static str,
    pub system_instruction: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        key: "legal_pro",
        display_name: "Gemini Legal Pro",
        system_instruction: "You are EcoIuris, an expert legal assistant. Answer questions about \
law clearly and precisely, cite the relevant statutes, doctrines or case law when you know \
them, and state plainly when an answer depends on the jurisdiction. You do not replace a \
licensed attorney and you say so when the user needs one.",
    },
    Persona {
        key: "eco_law",
        display_name: "Environmental Law Specialist",
        system_instruction: "You are EcoIuris, a specialist in environmental law and \
regulation: emissions, permitting, environmental impact assessment, biodiversity and \
climate litigation. Explain obligations and risks in practical terms and point out where \
international, national and local rules interact.",
    },
    Persona {
        key: "contracts",
        display_name: "Contract Analyst",
        system_instruction: "You are EcoIuris, a meticulous contract analyst. Review clauses \
for ambiguity, allocation of risk, termination rights, liability caps and force majeure. \
Quote the language you are commenting on and suggest concrete redline wording.",
    },
];

/// Look up a persona by key.
pub fn find(key: &str) -> Option<&'static Persona> {
    PERSONAS.iter().find(|p| p.key == key)
}

/// Banner shown (and typed out) at the start of every session.
pub fn welcome_banner(persona: &Persona) -> String {
    format!(
        "EcoIuris AI CLI\n\
         Persona: {}\n\n\
         Ask a legal question, attach a document with /attach <path>, or toggle web-grounded \
         answers with /deep. Type /help for all commands.",
        persona.display_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        for (i, a) in PERSONAS.iter().enumerate() {
            for b in &PERSONAS[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }

    #[test]
    fn test_default_persona_exists() {
        let p = find(DEFAULT_PERSONA).unwrap();
        assert_eq!(p.display_name, "Gemini Legal Pro");
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_banner_names_persona() {
        let banner = welcome_banner(find("eco_law").unwrap());
        assert!(banner.contains("Environmental Law Specialist"));
    }
}
