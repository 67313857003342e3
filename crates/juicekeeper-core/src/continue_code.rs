// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Continue-code encoder.
//!
//! A continue code is the salted hashids encoding of the catalog ids of every
//! solved challenge. Instances decode and apply codes themselves, so this module
//! only encodes. Salt, alphabet and minimum length must match what the
//! instances use and are therefore fixed constants.

use thiserror::Error;
use tracing::warn;

use crate::catalog::ChallengeCatalog;
use crate::progress::ChallengeProgress;

/// Salt shared with every instance.
pub const CONTINUE_CODE_SALT: &str = "this is my salt";

/// Minimum encoded length; shorter encodings are padded.
pub const CONTINUE_CODE_MIN_LENGTH: usize = 60;

/// Output alphabet.
pub const CONTINUE_CODE_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

const SEPARATORS: &str = "cfhistuCFHISTU";
const SEPARATOR_RATIO: f64 = 3.5;
const GUARD_RATIO: f64 = 12.0;
const MIN_ALPHABET_LENGTH: usize = 16;

/// Errors from building an encoder or encoding ids.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Nothing to encode.
    #[error("cannot encode an empty id list")]
    EmptyInput,

    /// The alphabet has fewer than 16 unique characters.
    #[error("alphabet must contain at least {MIN_ALPHABET_LENGTH} unique characters")]
    AlphabetTooShort,

    /// The alphabet repeats a character.
    #[error("alphabet contains duplicate character '{0}'")]
    DuplicateCharacter(char),

    /// The alphabet contains whitespace.
    #[error("alphabet must not contain whitespace")]
    Whitespace,
}

/// Salted, padded hashids encoder for challenge id lists.
#[derive(Debug, Clone)]
pub struct ContinueCodeEncoder {
    alphabet: Vec<char>,
    separators: Vec<char>,
    guards: Vec<char>,
    salt: Vec<char>,
    min_length: usize,
}

impl Default for ContinueCodeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinueCodeEncoder {
    /// Create the encoder with the system-wide salt, alphabet and length.
    pub fn new() -> Self {
        match Self::with_parameters(
            CONTINUE_CODE_SALT,
            CONTINUE_CODE_MIN_LENGTH,
            CONTINUE_CODE_ALPHABET,
        ) {
            Ok(encoder) => encoder,
            // The constants above are a valid alphabet; this arm is unreachable.
            Err(e) => unreachable!("invalid continue code constants: {e}"),
        }
    }

    fn with_parameters(salt: &str, min_length: usize, alphabet: &str) -> Result<Self, CodecError> {
        let mut chars: Vec<char> = Vec::with_capacity(alphabet.len());
        for c in alphabet.chars() {
            if c.is_whitespace() {
                return Err(CodecError::Whitespace);
            }
            if chars.contains(&c) {
                return Err(CodecError::DuplicateCharacter(c));
            }
            chars.push(c);
        }
        if chars.len() < MIN_ALPHABET_LENGTH {
            return Err(CodecError::AlphabetTooShort);
        }

        let salt: Vec<char> = salt.chars().collect();

        let mut separators: Vec<char> = SEPARATORS.chars().filter(|c| chars.contains(c)).collect();
        chars.retain(|c| !separators.contains(c));
        consistent_shuffle(&mut separators, &salt);

        if separators.is_empty() || chars.len() as f64 / separators.len() as f64 > SEPARATOR_RATIO
        {
            let mut wanted = (chars.len() as f64 / SEPARATOR_RATIO).ceil() as usize;
            if wanted == 1 {
                wanted += 1;
            }
            if wanted > separators.len() {
                let missing = wanted - separators.len();
                separators.extend(chars.drain(..missing));
            } else {
                separators.truncate(wanted);
            }
        }

        consistent_shuffle(&mut chars, &salt);

        let guard_count = (chars.len() as f64 / GUARD_RATIO).ceil() as usize;
        let guards = if chars.len() < 3 {
            separators.drain(..guard_count).collect()
        } else {
            chars.drain(..guard_count).collect()
        };

        Ok(Self {
            alphabet: chars,
            separators,
            guards,
            salt,
            min_length,
        })
    }

    /// Encode an ordered list of catalog ids.
    pub fn encode(&self, ids: &[u64]) -> Result<String, CodecError> {
        if ids.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let mut alphabet = self.alphabet.clone();
        let ids_hash: u64 = ids
            .iter()
            .enumerate()
            .map(|(i, id)| id % (i as u64 + 100))
            .sum();

        let lottery = alphabet[(ids_hash % alphabet.len() as u64) as usize];
        let mut result = vec![lottery];

        for (i, &id) in ids.iter().enumerate() {
            let mut shuffle_salt = Vec::with_capacity(1 + self.salt.len() + alphabet.len());
            shuffle_salt.push(lottery);
            shuffle_salt.extend_from_slice(&self.salt);
            shuffle_salt.extend_from_slice(&alphabet);
            shuffle_salt.truncate(alphabet.len());
            consistent_shuffle(&mut alphabet, &shuffle_salt);

            let hashed = hash(id, &alphabet);
            result.extend_from_slice(&hashed);

            if i + 1 < ids.len() {
                let reduced = id % (hashed[0] as u64 + i as u64);
                result.push(self.separators[(reduced % self.separators.len() as u64) as usize]);
            }
        }

        if result.len() < self.min_length {
            let index = (ids_hash + result[0] as u64) % self.guards.len() as u64;
            result.insert(0, self.guards[index as usize]);

            if result.len() < self.min_length {
                let index = (ids_hash + result[2] as u64) % self.guards.len() as u64;
                result.push(self.guards[index as usize]);
            }
        }

        let half = alphabet.len() / 2;
        while result.len() < self.min_length {
            let salt = alphabet.clone();
            consistent_shuffle(&mut alphabet, &salt);

            let mut padded = Vec::with_capacity(result.len() + alphabet.len());
            padded.extend_from_slice(&alphabet[half..]);
            padded.extend_from_slice(&result);
            padded.extend_from_slice(&alphabet[..half]);
            result = padded;

            let excess = result.len().saturating_sub(self.min_length);
            if excess > 0 {
                let start = excess / 2;
                result = result[start..start + self.min_length].to_vec();
            }
        }

        Ok(result.into_iter().collect())
    }

    /// Encode solved challenges by looking up their catalog ids.
    ///
    /// Keys missing from the catalog are logged and left out.
    pub fn encode_progress(
        &self,
        catalog: &ChallengeCatalog,
        challenges: &[ChallengeProgress],
    ) -> Result<String, CodecError> {
        let ids: Vec<u64> = challenges
            .iter()
            .filter_map(|challenge| match catalog.id_of(&challenge.key) {
                Some(id) => Some(id as u64),
                None => {
                    warn!(
                        challenge = %challenge.key,
                        "Challenge is not in the catalog, leaving it out of the continue code"
                    );
                    None
                }
            })
            .collect();

        self.encode(&ids)
    }
}

fn consistent_shuffle(chars: &mut [char], salt: &[char]) {
    if salt.is_empty() {
        return;
    }

    let mut v = 0usize;
    let mut p = 0usize;
    for i in (1..chars.len()).rev() {
        let s = salt[v] as usize;
        p += s;
        let j = (s + v + p) % i;
        chars.swap(i, j);
        v = (v + 1) % salt.len();
    }
}

fn hash(mut value: u64, alphabet: &[char]) -> Vec<char> {
    let base = alphabet.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(alphabet[(value % base) as usize]);
        value /= base;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    out
}
