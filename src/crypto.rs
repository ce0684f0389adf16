use anyhow::Result;
#[cfg(windows)]
use anyhow::{anyhow, Context};

#[cfg(windows)]
mod dpapi {
    use super::*;
    use std::ptr;

    use windows_sys::Win32::Foundation::LocalFree;
    use windows_sys::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPT_INTEGER_BLOB,
    };

    #[derive(Clone, Copy)]
    pub enum Op {
        Protect,
        Unprotect,
    }

    pub fn run(op: Op, input: &[u8]) -> Result<Vec<u8>> {
        let mut in_blob = CRYPT_INTEGER_BLOB {
            cbData: u32::try_from(input.len()).map_err(|_| anyhow!("payload too large"))?,
            pbData: input.as_ptr() as *mut u8,
        };
        let mut out_blob = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };

        // Per-user scope, no extra entropy, no prompt.
        let ok = unsafe {
            match op {
                Op::Protect => CryptProtectData(
                    &mut in_blob,
                    ptr::null(),
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut out_blob,
                ),
                Op::Unprotect => CryptUnprotectData(
                    &mut in_blob,
                    ptr::null_mut(),
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut out_blob,
                ),
            }
        };
        if ok == 0 {
            return Err(anyhow!("DPAPI call failed"));
        }
        if out_blob.pbData.is_null() {
            return Ok(Vec::new());
        }

        let out = unsafe {
            let bytes =
                std::slice::from_raw_parts(out_blob.pbData, out_blob.cbData as usize).to_vec();
            let _ = LocalFree(out_blob.pbData as _);
            bytes
        };
        Ok(out)
    }
}

/// Whether config payloads are actually encrypted on this platform.
pub const ENCRYPTS: bool = cfg!(windows);

#[cfg(windows)]
pub fn encrypt_for_current_user(plaintext: &[u8]) -> Result<Vec<u8>> {
    dpapi::run(dpapi::Op::Protect, plaintext).context("encrypt_for_current_user")
}

#[cfg(windows)]
pub fn decrypt_for_current_user(ciphertext: &[u8]) -> Result<Vec<u8>> {
    dpapi::run(dpapi::Op::Unprotect, ciphertext).context("decrypt_for_current_user")
}

#[cfg(not(windows))]
pub fn encrypt_for_current_user(plaintext: &[u8]) -> Result<Vec<u8>> {
    Ok(plaintext.to_vec())
}

#[cfg(not(windows))]
pub fn decrypt_for_current_user(ciphertext: &[u8]) -> Result<Vec<u8>> {
    Ok(ciphertext.to_vec())
}
