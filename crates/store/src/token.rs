//! Object tokens: lowercase hex digests naming stored objects.

use std::fmt;

use thiserror::Error;

/// The digest families a token can come from; each gets its own route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Registration order of the store routes.
    pub const ALL: [Self; 6] = [Self::Md5, Self::Sha1, Self::Sha224, Self::Sha256, Self::Sha384, Self::Sha512];

    pub const fn bits(self) -> u16 {
        match self {
            Self::Md5 => 128,
            Self::Sha1 => 160,
            Self::Sha224 => 224,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    /// Hex digits in a token of this algorithm.
    pub const fn token_len(self) -> usize {
        self.bits() as usize / 4
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Md5 => "/store/128/",
            Self::Sha1 => "/store/160/",
            Self::Sha224 => "/store/224/",
            Self::Sha256 => "/store/256/",
            Self::Sha384 => "/store/384/",
            Self::Sha512 => "/store/512/",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("token is not hexadecimal")]
    NotHex,
}

/// A validated, lowercased token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// # Errors
    ///
    /// Fails unless `text` is exactly `algorithm.token_len()` hex digits.
    pub fn parse(algorithm: Algorithm, text: &str) -> Result<Self, TokenError> {
        if text.len() != algorithm.token_len() {
            return Err(TokenError::Length { expected: algorithm.token_len(), actual: text.len() });
        }
        if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenError::NotHex);
        }
        Ok(Self(text.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for bytes::Bytes {
    fn from(token: Token) -> Self {
        bytes::Bytes::from(token.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_and_prefixes() {
        let lengths: Vec<_> = Algorithm::ALL.iter().map(|a| a.token_len()).collect();
        assert_eq!(lengths, [32, 40, 56, 64, 96, 128]);
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.prefix(), format!("/store/{}/", algorithm.bits()));
            assert_eq!(algorithm.token_len() * 4, usize::from(algorithm.bits()));
        }
        assert_eq!(Algorithm::Sha224.to_string(), "sha224");
    }

    #[test]
    fn accepts_hex_of_exact_length_and_lowercases() {
        let token = Token::parse(Algorithm::Md5, "D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(token.as_str(), "d41d8cd98f00b204e9800998ecf8427e");

        let sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(Token::parse(Algorithm::Sha256, sha256).unwrap().as_str(), sha256);
    }

    #[test]
    fn refuses_wrong_length_or_non_hex() {
        assert_eq!(
            Token::parse(Algorithm::Md5, "abc"),
            Err(TokenError::Length { expected: 32, actual: 3 })
        );
        let sha1 = "da39a3ee5e6b4b0d3255bfef95601890afd8070g";
        assert_eq!(Token::parse(Algorithm::Sha1, sha1), Err(TokenError::NotHex));
        let md5_len_for_sha1 = "d41d8cd98f00b204e9800998ecf8427e";
        assert!(matches!(Token::parse(Algorithm::Sha1, md5_len_for_sha1), Err(TokenError::Length { .. })));
    }
}
