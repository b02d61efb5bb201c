// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use zeroize::Zeroize;

use hwlink::{proto::HARDENED, Challenge, ChallengeKind, ChallengeResponder};

#[derive(Clone, PartialEq, Debug)]
pub struct HexData<const N: usize = 32>(pub [u8; N]);

impl<const N: usize> std::str::FromStr for HexData<N> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0u8; N];

        hex::decode_to_slice(s, &mut b)?;

        Ok(HexData(b))
    }
}

impl<const N: usize> AsRef<[u8; N]> for HexData<N> {
    fn as_ref(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> std::fmt::Display for HexData<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// BIP-0032 derivation path (`m/44'/0'/0'/0/0`)
#[derive(Clone, PartialEq, Debug)]
pub struct DerivationPath(pub Vec<u32>);

impl std::str::FromStr for DerivationPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = vec![];

        for (i, c) in s.split('/').enumerate() {
            if i == 0 && c == "m" {
                continue;
            }

            let (c, hardened) = match c.strip_suffix(['\'', 'h']) {
                Some(c) => (c, true),
                None => (c, false),
            };

            let n: u32 = c
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid path component: '{}'", c))?;
            if n >= HARDENED {
                return Err(anyhow::anyhow!("path component out of range: {}", n));
            }

            p.push(if hardened { n | HARDENED } else { n });
        }

        Ok(DerivationPath(p))
    }
}

impl AsRef<[u32]> for DerivationPath {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

/// Answers device challenges from the console
pub struct ConsoleResponder;

impl ConsoleResponder {
    async fn read_line(prompt: &str) -> Option<Vec<u8>> {
        eprint!("{prompt}: ");

        let mut s = String::new();
        let mut r = BufReader::new(tokio::io::stdin());
        if r.read_line(&mut s).await.ok()? == 0 {
            return None;
        }

        let b = s.trim_end().as_bytes().to_vec();
        s.zeroize();

        Some(b)
    }
}

#[async_trait]
impl ChallengeResponder for ConsoleResponder {
    async fn answer(&self, c: &Challenge) -> Option<Vec<u8>> {
        match c.kind {
            ChallengeKind::Button => {
                info!("Confirm on device");
                Some(vec![])
            }
            ChallengeKind::Pin => {
                eprintln!("Enter PIN using the positions shown on the device:");
                eprintln!("  7 8 9\n  4 5 6\n  1 2 3");
                Self::read_line("PIN").await
            }
            ChallengeKind::Passphrase => Self::read_line("Passphrase").await,
            ChallengeKind::Word => Self::read_line("Word").await,
            ChallengeKind::Otp => Self::read_line("One-time password").await,
        }
    }
}
