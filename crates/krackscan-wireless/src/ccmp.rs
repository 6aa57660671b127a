//! CCMP (AES-CCM) packet number extraction and payload protection
//!
//! Layout of a protected data frame:
//!
//! ```text
//! | MAC header | PN0 PN1 rsvd KeyID PN2 PN3 PN4 PN5 | ciphertext | MIC (8) |
//! ```
//!
//! The packet number is the 48-bit little-endian counter spread over the
//! eight-byte CCMP header. The nonce and AAD follow IEEE 802.11-2016
//! section 12.5.3.3.

use aes::Aes128;
use ccm::aead::consts::{U13, U8};
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::Ccm;

use crate::error::{Result, WirelessError};
use crate::frames::{extract_priority, header_len, FrameControl};

type Aes128Ccm = Ccm<Aes128, U8, U13>;

/// 128-bit pairwise temporal key
pub type TemporalKey = [u8; 16];

/// The key a vulnerable client installs after a key reinstallation
pub const ALL_ZERO_KEY: TemporalKey = [0u8; 16];

pub const CCMP_HEADER_LEN: usize = 8;
pub const CCMP_MIC_LEN: usize = 8;

/// ExtIV bit in the KeyID octet, always set for CCMP
const EXT_IV: u8 = 0x20;

/// Largest packet number representable in the header
pub const MAX_PN: u64 = (1 << 48) - 1;

/// LLC/SNAP header that starts every plaintext MSDU we expect
pub const LLC_SNAP_PREFIX: [u8; 6] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00];

/// Check whether a decrypted payload starts with an LLC/SNAP header
pub fn starts_with_llc_snap(payload: &[u8]) -> bool {
    payload.starts_with(&LLC_SNAP_PREFIX)
}

/// Locate the CCMP header of a protected frame
fn ccmp_header(frame: &[u8]) -> Result<(usize, &[u8])> {
    let fc = FrameControl::parse(frame)?;
    if !fc.protected() {
        return Err(WirelessError::invalid_frame("Frame is not protected"));
    }
    let hdr_len = header_len(frame)?;
    let header = frame
        .get(hdr_len..hdr_len + CCMP_HEADER_LEN)
        .ok_or_else(|| WirelessError::invalid_frame("Frame too short for CCMP header"))?;
    if header[3] & EXT_IV == 0 {
        return Err(WirelessError::invalid_frame("ExtIV not set; not a CCMP frame"));
    }
    Ok((hdr_len, header))
}

/// Extract the 48-bit packet number of a protected frame
pub fn extract_iv(frame: &[u8]) -> Result<u64> {
    let (_, h) = ccmp_header(frame)?;
    Ok(u64::from(h[0])
        | u64::from(h[1]) << 8
        | u64::from(h[4]) << 16
        | u64::from(h[5]) << 24
        | u64::from(h[6]) << 32
        | u64::from(h[7]) << 40)
}

fn pn_header(pn: u64, key_id: u8) -> [u8; CCMP_HEADER_LEN] {
    [
        pn as u8,
        (pn >> 8) as u8,
        0x00,
        EXT_IV | ((key_id & 0x03) << 6),
        (pn >> 16) as u8,
        (pn >> 24) as u8,
        (pn >> 32) as u8,
        (pn >> 40) as u8,
    ]
}

fn build_nonce(frame: &[u8], pn: u64) -> Result<[u8; 13]> {
    let mut nonce = [0u8; 13];
    nonce[0] = extract_priority(frame)?;
    nonce[1..7].copy_from_slice(&frame[10..16]);
    for (i, byte) in nonce[7..13].iter_mut().enumerate() {
        *byte = (pn >> (8 * (5 - i))) as u8;
    }
    Ok(nonce)
}

fn build_aad(frame: &[u8]) -> Result<Vec<u8>> {
    let fc = FrameControl::parse(frame)?;
    let four_addr = fc.to_ds() && fc.from_ds();
    let qos = fc.is_qos_data();

    let mut aad = Vec::with_capacity(30);

    let fc0 = frame[0] & 0x8F;
    let mut fc1 = frame[1] & !0x38; // Retry, PwrMgt, MoreData
    if qos {
        fc1 &= !0x80; // Order
    }
    fc1 |= 0x40; // Protected
    aad.push(fc0);
    aad.push(fc1);

    aad.extend_from_slice(&frame[4..22]);
    aad.push(frame[22] & 0x0F);
    aad.push(0);

    let mut offset = 24;
    if four_addr {
        let a4 = frame
            .get(24..30)
            .ok_or_else(|| WirelessError::invalid_frame("Frame too short for address 4"))?;
        aad.extend_from_slice(a4);
        offset = 30;
    }
    if qos {
        let qc = frame
            .get(offset)
            .ok_or_else(|| WirelessError::invalid_frame("Frame too short for QoS control"))?;
        aad.push(qc & 0x0F);
        aad.push(0);
    }

    Ok(aad)
}

/// Decrypt and authenticate the body of a CCMP-protected frame.
///
/// Returns the plaintext MSDU. Fails with [`WirelessError::Decrypt`] when
/// the MIC does not verify under `key`.
pub fn decrypt_ccmp(frame: &[u8], key: &TemporalKey) -> Result<Vec<u8>> {
    let (hdr_len, _) = ccmp_header(frame)?;
    let body_start = hdr_len + CCMP_HEADER_LEN;
    if frame.len() < body_start + CCMP_MIC_LEN {
        return Err(WirelessError::invalid_frame("Frame too short for CCMP MIC"));
    }
    let mic_start = frame.len() - CCMP_MIC_LEN;

    let pn = extract_iv(frame)?;
    let nonce = build_nonce(frame, pn)?;
    let aad = build_aad(frame)?;

    let mut plaintext = frame[body_start..mic_start].to_vec();
    let cipher = Aes128Ccm::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&nonce),
            &aad,
            &mut plaintext,
            GenericArray::from_slice(&frame[mic_start..]),
        )
        .map_err(|_| WirelessError::Decrypt(format!("MIC mismatch for PN {}", pn)))?;

    Ok(plaintext)
}

/// Protect a plaintext data frame with CCMP.
///
/// `frame` is a MAC header followed by the plaintext body. The returned
/// frame has the Protected bit set, the CCMP header inserted and the MIC
/// appended.
pub fn encrypt_ccmp(frame: &[u8], pn: u64, key_id: u8, key: &TemporalKey) -> Result<Vec<u8>> {
    if pn > MAX_PN {
        return Err(WirelessError::invalid_frame(format!(
            "Packet number {} exceeds 48 bits",
            pn
        )));
    }
    let hdr_len = header_len(frame)?;

    let mut out = Vec::with_capacity(frame.len() + CCMP_HEADER_LEN + CCMP_MIC_LEN);
    out.extend_from_slice(&frame[..hdr_len]);
    out[1] |= 0x40;
    out.extend_from_slice(&pn_header(pn, key_id));

    let nonce = build_nonce(&out, pn)?;
    let aad = build_aad(&out)?;

    let mut body = frame[hdr_len..].to_vec();
    let cipher = Aes128Ccm::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &aad, &mut body)
        .map_err(|_| WirelessError::Decrypt("CCM encryption failed".into()))?;

    out.extend_from_slice(&body);
    out.extend_from_slice(&tag);
    Ok(out)
}
