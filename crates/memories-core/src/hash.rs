use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of a file, hex encoded
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// True if every file has the same content. Sizes are compared before
/// anything gets hashed.
pub fn all_identical(paths: &[&Path]) -> io::Result<bool> {
    let Some((first, rest)) = paths.split_first() else {
        return Ok(true);
    };

    let size = fs::metadata(first)?.len();
    for p in rest {
        if fs::metadata(p)?.len() != size {
            return Ok(false);
        }
    }

    let reference = hash_file(first)?;
    for p in rest {
        if hash_file(p)? != reference {
            return Ok(false);
        }
    }
    Ok(true)
}
