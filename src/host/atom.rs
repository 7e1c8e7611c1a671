use super::signal::Sample;
use std::fmt;

/// A creation argument or message element.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Float(Sample),
    Symbol(String),
}

impl Atom {
    // Anything that reads as a number is a float; everything else is a symbol.
    pub fn parse(word: &str) -> Atom {
        match word.parse::<Sample>() {
            Ok(value) => Atom::Float(value),
            Err(_) => Atom::Symbol(String::from(word)),
        }
    }

    pub fn parse_list(text: &str) -> Vec<Atom> {
        text.split_whitespace().map(Atom::parse).collect()
    }

    pub fn as_float(&self) -> Option<Sample> {
        match self {
            Atom::Float(value) => Some(*value),
            Atom::Symbol(_) => None,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Float(value) => write!(f, "{}", value),
            Atom::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}
