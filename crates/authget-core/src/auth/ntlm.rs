/// NTLM message codec.
///
/// Implements the client half of the three-message handshake:
///   Type 1 – Negotiate    (client → server)
///   Type 2 – Challenge    (server → client)
///   Type 3 – Authenticate (client → server)
///
/// The response is NTLMv1: the NT hash keys three single-block DES
/// encryptions of the server challenge. No client nonce or timestamp is
/// mixed in, so the authenticate message depends only on the parsed
/// challenge and the identity.

use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use des::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use des::Des;
use md4::{Digest, Md4};

// ---------------------------------------------------------------------------
// NTLM flag bits (subset)
// ---------------------------------------------------------------------------
pub const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
pub const NEGOTIATE_OEM: u32 = 0x0000_0002;
pub const REQUEST_TARGET: u32 = 0x0000_0004;
pub const NEGOTIATE_NTLM: u32 = 0x0000_0200;
pub const NEGOTIATE_DOMAIN_SUPPLIED: u32 = 0x0000_1000;
pub const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;

pub const SCHEME: &str = "NTLM";

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const NEGOTIATE_LEN: usize = 32;
const CHALLENGE_MIN_LEN: usize = 32;
const AUTHENTICATE_LEN: usize = 64;

/// Produces and consumes the opaque handshake messages for one identity.
pub trait NtlmCodec {
    fn negotiate(&mut self) -> Vec<u8>;
    fn parse_challenge(&mut self, data: &[u8]) -> Result<()>;
    fn authenticate(&mut self) -> Result<Vec<u8>>;
}

/// `"NTLM <base64(message)>"`.
pub fn header_value(message: &[u8]) -> String {
    format!("{} {}", SCHEME, STANDARD.encode(message))
}

/// Decode the base64 blob carried after the scheme token.
pub fn decode_token(token: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(token.trim())
        .map_err(|e| AuthError::protocol(format!("NTLM challenge is not valid base64: {}", e)))
}

// ---------------------------------------------------------------------------
// Type 2 – Challenge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_name: String,
}

impl ChallengeMessage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CHALLENGE_MIN_LEN {
            return Err(AuthError::protocol(format!(
                "NTLM challenge too short: {} bytes",
                data.len()
            )));
        }
        if &data[0..8] != SIGNATURE {
            return Err(AuthError::protocol("invalid NTLM signature"));
        }
        let kind = read_u32(data, 8);
        if kind != 2 {
            return Err(AuthError::protocol(format!("expected NTLM Type 2, got {}", kind)));
        }

        let flags = read_u32(data, 20);
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&data[24..32]);

        let target_name = match security_buffer(data, 12) {
            Some(raw) if !raw.is_empty() => decode_string(raw, flags & NEGOTIATE_UNICODE != 0),
            _ => String::new(),
        };

        Ok(ChallengeMessage { flags, server_challenge, target_name })
    }

    pub fn unicode(&self) -> bool {
        self.flags & NEGOTIATE_UNICODE != 0
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct NtlmClient {
    user: String,
    domain: String,
    password: String,
    workstation: String,
    challenge: Option<ChallengeMessage>,
}

impl NtlmClient {
    pub fn new(user: &str, domain: &str, password: &str) -> Self {
        NtlmClient {
            user: user.to_string(),
            domain: domain.to_string(),
            password: password.to_string(),
            workstation: String::new(),
            challenge: None,
        }
    }

    pub fn with_workstation(mut self, workstation: &str) -> Self {
        self.workstation = workstation.to_string();
        self
    }

    pub fn challenge(&self) -> Option<&ChallengeMessage> {
        self.challenge.as_ref()
    }
}

impl std::fmt::Debug for NtlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmClient")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("workstation", &self.workstation)
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

impl NtlmCodec for NtlmClient {
    /// Type 1. The domain travels upper-cased in OEM encoding.
    fn negotiate(&mut self) -> Vec<u8> {
        let domain = self.domain.to_uppercase().into_bytes();

        let mut flags = NEGOTIATE_UNICODE
            | NEGOTIATE_OEM
            | REQUEST_TARGET
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN;
        if !domain.is_empty() {
            flags |= NEGOTIATE_DOMAIN_SUPPLIED;
        }

        let mut msg = Vec::with_capacity(NEGOTIATE_LEN + domain.len());
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&1u32.to_le_bytes());
        msg.extend_from_slice(&flags.to_le_bytes());
        write_security_buffer(&mut msg, domain.len(), NEGOTIATE_LEN);
        write_security_buffer(&mut msg, 0, NEGOTIATE_LEN + domain.len());
        msg.extend_from_slice(&domain);
        msg
    }

    fn parse_challenge(&mut self, data: &[u8]) -> Result<()> {
        self.challenge = Some(ChallengeMessage::parse(data)?);
        Ok(())
    }

    /// Type 3. Strings are UTF-16LE when the challenge negotiated Unicode.
    fn authenticate(&mut self) -> Result<Vec<u8>> {
        let challenge = self.challenge.as_ref().ok_or_else(|| {
            AuthError::protocol("NTLM authenticate requested before a challenge was parsed")
        })?;

        let nt = nt_response(&self.password, &challenge.server_challenge);
        // LM slot repeats the NT response (LM hashes are never sent).
        let lm = nt;

        let unicode = challenge.unicode();
        let encode = |s: &str| {
            if unicode {
                to_utf16le(s)
            } else {
                s.as_bytes().to_vec()
            }
        };
        let domain = encode(&self.domain);
        let user = encode(&self.user);
        let workstation = encode(&self.workstation);

        let charset = if unicode { NEGOTIATE_UNICODE } else { NEGOTIATE_OEM };
        let flags = charset | REQUEST_TARGET | NEGOTIATE_NTLM | NEGOTIATE_ALWAYS_SIGN;

        let payload: [&[u8]; 5] = [&lm, &nt, &domain, &user, &workstation];
        let payload_len: usize = payload.iter().map(|p| p.len()).sum();

        let mut msg = Vec::with_capacity(AUTHENTICATE_LEN + payload_len);
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&3u32.to_le_bytes());
        let mut offset = AUTHENTICATE_LEN;
        for field in payload {
            write_security_buffer(&mut msg, field.len(), offset);
            offset += field.len();
        }
        // EncryptedRandomSessionKey: empty
        write_security_buffer(&mut msg, 0, offset);
        msg.extend_from_slice(&flags.to_le_bytes());
        debug_assert_eq!(msg.len(), AUTHENTICATE_LEN);

        for field in payload {
            msg.extend_from_slice(field);
        }
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// MD4 of the UTF-16LE password.
fn nt_hash(password: &str) -> [u8; 16] {
    let digest = Md4::digest(to_utf16le(password));
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

/// 24-byte NTLMv1 response: the NT hash, zero-padded to 21 bytes, keys three
/// DES encryptions of the server challenge.
fn nt_response(password: &str, server_challenge: &[u8; 8]) -> [u8; 24] {
    let mut key_material = [0u8; 21];
    key_material[..16].copy_from_slice(&nt_hash(password));

    let mut response = [0u8; 24];
    for (key7, out) in key_material.chunks_exact(7).zip(response.chunks_exact_mut(8)) {
        let cipher = Des::new(GenericArray::from_slice(&des_key(key7)));
        let mut block = GenericArray::clone_from_slice(server_challenge);
        cipher.encrypt_block(&mut block);
        out.copy_from_slice(&block);
    }
    response
}

/// Spread 56 key bits over 8 bytes, 7 bits each, low bit set for odd parity.
fn des_key(key7: &[u8]) -> [u8; 8] {
    let bits = key7.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let mut key = [0u8; 8];
    for (i, k) in key.iter_mut().enumerate() {
        let seven = ((bits >> (49 - 7 * i)) & 0x7f) as u8;
        let shifted = seven << 1;
        *k = if shifted.count_ones() % 2 == 0 { shifted | 1 } else { shifted };
    }
    key
}

fn to_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

fn decode_string(raw: &[u8], unicode: bool) -> String {
    if unicode {
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Payload referenced by the 8-byte security buffer at `at`, if in bounds.
fn security_buffer(data: &[u8], at: usize) -> Option<&[u8]> {
    if at + 8 > data.len() {
        return None;
    }
    let len = read_u16(data, at) as usize;
    let offset = read_u32(data, at + 4) as usize;
    data.get(offset..offset.checked_add(len)?)
}

fn write_security_buffer(buf: &mut Vec<u8>, length: usize, offset: usize) {
    let length = length as u16;
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&length.to_le_bytes()); // MaxLength == Length
    buf.extend_from_slice(&(offset as u32).to_le_bytes());
}
