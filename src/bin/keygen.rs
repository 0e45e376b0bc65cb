// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Generate a forging secret phrase, or derive the public key and account of an existing one.
//!
//! `keygen [out_dir]` writes `<out_dir>/forger.secret` (mode 0600) and prints the public key.
//! `keygen --show` reads a phrase from `AMUN_SECRET_PHRASE` instead.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use amunchain_hybrid::core::security::crypto::SecretPhrase;
use amunchain_hybrid::core::types::FullId;

fn describe(secret: &SecretPhrase) -> Result<()> {
    let pk = secret.public_key().map_err(|e| anyhow!("public key: {e}"))?;
    let account = FullId::from_public_key(&pk);
    println!("public_key_hex = \"{}\"", pk.to_hex());
    println!("account = \"{account}\"");
    Ok(())
}

fn main() -> Result<()> {
    let arg = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    if arg == "--show" {
        let phrase = std::env::var("AMUN_SECRET_PHRASE").map_err(|_| anyhow!("AMUN_SECRET_PHRASE not set"))?;
        return describe(&SecretPhrase::new(phrase));
    }

    let mut path = PathBuf::from(arg);
    std::fs::create_dir_all(&path)?;
    path.push("forger.secret");
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }

    let secret = SecretPhrase::generate().map_err(|e| anyhow!("generate: {e}"))?;
    std::fs::write(&path, secret.expose())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }

    eprintln!("secret phrase written to {}", path.display());
    describe(&secret)
}
