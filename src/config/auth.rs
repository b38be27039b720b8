use crate::error::{ParseNumberSnafu, PasswordLengthTooLargeSnafu, SchoolResult};
use dotenvy::var;
use rand::{Rng, distr::Alphanumeric, rng};
use snafu::{OptionExt, ResultExt};
use std::ops::Range;

///shape of auto-generated default passwords: `<letters>_<number>`
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub word_len_range: Range<usize>,
    pub numbers_range: Range<usize>,
}

impl AuthConfig {
    pub fn from_env() -> SchoolResult<Self> {
        let config = Self::default();

        match var("SCHOOLYARD_PASSWORD_MIN_LEN") {
            Ok(min_len) => config.with_min_len(min_len.parse().context(ParseNumberSnafu {
                name: "SCHOOLYARD_PASSWORD_MIN_LEN",
            })?),
            Err(_) => Ok(config),
        }
    }

    ///keeps the width of the word length range, moving its start
    fn with_min_len(mut self, min_len: usize) -> SchoolResult<Self> {
        let width = self.word_len_range.len();
        let max_len = min_len
            .checked_add(width)
            .context(PasswordLengthTooLargeSnafu { min_len })?;
        self.word_len_range = min_len..max_len;
        Ok(self)
    }

    pub fn generate(&self) -> String {
        let mut rng = rng();

        let word_len = rng.random_range(self.word_len_range.clone());
        let chosen_word: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(word_len)
            .map(char::from)
            .collect();

        let chosen_number = rng.random_range(self.numbers_range.clone());

        format!("{chosen_word}_{chosen_number}")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            word_len_range: 6..10,
            numbers_range: 1_000..10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_follow_the_configured_shape() {
        let config = AuthConfig::default();

        for _ in 0..50 {
            let password = config.generate();
            let (word, number) = password.split_once('_').expect("always has a separator");

            assert!(config.word_len_range.contains(&word.len()));
            assert!(word.chars().all(|c| c.is_ascii_alphanumeric()));
            let number: usize = number.parse().expect("suffix is numeric");
            assert!(config.numbers_range.contains(&number));
        }
    }

    #[test]
    fn minimum_length_moves_the_range() {
        let config = AuthConfig::default().with_min_len(12).unwrap();
        assert_eq!(config.word_len_range, 12..16);

        assert!(AuthConfig::default().with_min_len(usize::MAX).is_err());
    }
}
