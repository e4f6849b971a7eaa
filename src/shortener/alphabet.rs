use anyhow::{bail, Result};
use rand::RngExt;

use crate::config::ShortCodeConfig;

/// The symbol set short codes are drawn from
#[derive(Debug, Clone)]
pub struct CodeAlphabet {
    symbols: Vec<char>,
}

impl CodeAlphabet {
    /// Duplicate symbols are dropped, keeping first occurrence order
    pub fn new(symbols: &str) -> Result<Self> {
        let mut unique: Vec<char> = Vec::with_capacity(symbols.len());
        for c in symbols.chars() {
            if c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%' | '.') {
                bail!("short code alphabet contains a symbol unsafe in a URL path: {c:?}");
            }
            if !unique.contains(&c) {
                unique.push(c);
            }
        }

        if unique.len() < 2 {
            bail!("short code alphabet needs at least two distinct symbols");
        }

        Ok(Self { symbols: unique })
    }

    pub fn from_config(config: &ShortCodeConfig) -> Result<Self> {
        Self::new(&config.alphabet)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.symbols.contains(&c)
    }

    /// Draw `length` symbols uniformly at random
    pub fn draw(&self, length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| self.symbols[rng.random_range(0..self.symbols.len())])
            .collect()
    }

    /// Number of distinct codes of the given length, saturating
    pub fn capacity(&self, length: usize) -> u128 {
        (self.symbols.len() as u128).saturating_pow(length as u32)
    }
}
