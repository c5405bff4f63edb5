//! Web Push message encryption (aes128gcm content-coding).
//!
//! Key agreement is ECDH over P-256 with a fresh ephemeral key pair per
//! message; key material is expanded with HKDF-SHA256; the record is sealed
//! with AES-128-GCM and framed as
//!
//! ```text
//! salt (16) ‖ record size (u32 BE, 4096) ‖ key id length (u8, 65)
//!           ‖ ephemeral public key (65, uncompressed point) ‖ ciphertext+tag
//! ```
//!
//! Interoperability depends on this layout being bit-exact, so the frame and
//! the HKDF info blocks are built by small explicit functions and tested
//! byte-for-byte — no codec abstraction on top.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use base64::Engine as _;
use hkdf::Hkdf;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use remesa_common::error::AppError;

pub const SALT_LEN: usize = 16;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;
/// Fixed record size advertised in the frame header.
pub const RECORD_SIZE: u32 = 4096;

const PRK_INFO: &[u8] = b"Content-Encoding: auth\0";
const CEK_LABEL: &str = "aesgcm";
const NONCE_LABEL: &str = "nonce";
/// Single-byte padding delimiter appended to every plaintext. Full random
/// padding is intentionally omitted.
const PAD_DELIMITER: u8 = 0x02;

pub fn decode_b64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.as_bytes())
}

pub fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

/// Decode a subscription's `p256dh`/`auth` fields into raw key material.
pub fn decode_subscription_keys(
    p256dh: &str,
    auth: &str,
) -> Result<([u8; PUBLIC_KEY_LEN], [u8; AUTH_SECRET_LEN]), AppError> {
    let client_public = decode_b64url(p256dh)
        .map_err(|e| AppError::PushCipher(format!("invalid p256dh key: {}", e)))?;
    let client_public: [u8; PUBLIC_KEY_LEN] = client_public
        .try_into()
        .map_err(|_| AppError::PushCipher("p256dh key must decode to 65 bytes".to_string()))?;

    let auth_secret = decode_b64url(auth)
        .map_err(|e| AppError::PushCipher(format!("invalid auth secret: {}", e)))?;
    let auth_secret: [u8; AUTH_SECRET_LEN] = auth_secret
        .try_into()
        .map_err(|_| AppError::PushCipher("auth secret must decode to 16 bytes".to_string()))?;

    Ok((client_public, auth_secret))
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, AppError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| AppError::PushCipher("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Mix the ECDH shared secret with the subscriber's auth secret into the
/// 32-byte pseudorandom key everything else derives from.
fn derive_pseudorandom_key(
    shared_secret: &[u8],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<[u8; 32], AppError> {
    let prk = hkdf_sha256(auth_secret, shared_secret, PRK_INFO, 32)?;
    prk.try_into()
        .map_err(|_| AppError::PushCipher("PRK length mismatch".to_string()))
}

/// Build the HKDF info block for the content key or nonce derivation:
/// `"Content-Encoding: " label NUL "P-256" NUL len‖clientKey len‖serverKey`
/// with 2-byte big-endian lengths.
fn build_key_info(
    label: &str,
    client_key: &[u8; PUBLIC_KEY_LEN],
    server_key: &[u8; PUBLIC_KEY_LEN],
) -> Vec<u8> {
    let mut info = Vec::with_capacity(18 + label.len() + 7 + 2 * (2 + PUBLIC_KEY_LEN));
    info.extend_from_slice(b"Content-Encoding: ");
    info.extend_from_slice(label.as_bytes());
    info.push(0);
    info.extend_from_slice(b"P-256");
    info.push(0);
    info.extend_from_slice(&(PUBLIC_KEY_LEN as u16).to_be_bytes());
    info.extend_from_slice(client_key);
    info.extend_from_slice(&(PUBLIC_KEY_LEN as u16).to_be_bytes());
    info.extend_from_slice(server_key);
    info
}

fn derive_content_key(
    salt: &[u8; SALT_LEN],
    prk: &[u8; 32],
    client_key: &[u8; PUBLIC_KEY_LEN],
    server_key: &[u8; PUBLIC_KEY_LEN],
) -> Result<[u8; 16], AppError> {
    let info = build_key_info(CEK_LABEL, client_key, server_key);
    let cek = hkdf_sha256(salt, prk, &info, 16)?;
    cek.try_into()
        .map_err(|_| AppError::PushCipher("CEK length mismatch".to_string()))
}

fn derive_nonce(
    salt: &[u8; SALT_LEN],
    prk: &[u8; 32],
    client_key: &[u8; PUBLIC_KEY_LEN],
    server_key: &[u8; PUBLIC_KEY_LEN],
) -> Result<[u8; 12], AppError> {
    let info = build_key_info(NONCE_LABEL, client_key, server_key);
    let nonce = hkdf_sha256(salt, prk, &info, 12)?;
    nonce
        .try_into()
        .map_err(|_| AppError::PushCipher("nonce length mismatch".to_string()))
}

/// Append the single padding delimiter byte.
fn pad(plaintext: &[u8]) -> Vec<u8> {
    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(PAD_DELIMITER);
    padded
}

/// Assemble the aes128gcm record frame around the sealed ciphertext.
fn build_record_frame(
    salt: &[u8; SALT_LEN],
    server_public: &[u8; PUBLIC_KEY_LEN],
    ciphertext: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    frame.extend_from_slice(salt);
    frame.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    frame.push(PUBLIC_KEY_LEN as u8);
    frame.extend_from_slice(server_public);
    frame.extend_from_slice(ciphertext);
    frame
}

/// Encrypt a push payload for one subscriber.
///
/// Generates a fresh ephemeral key pair and salt per message and returns the
/// complete request body (header frame + ciphertext).
pub fn encrypt(
    plaintext: &[u8],
    client_public_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<Vec<u8>, AppError> {
    if plaintext.is_empty() {
        return Err(AppError::PushCipher("push payload cannot be empty".to_string()));
    }

    let client_public = PublicKey::from_sec1_bytes(client_public_raw)
        .map_err(|_| AppError::PushCipher("invalid subscriber public key".to_string()))?;

    let mut rng = OsRng;
    let server_secret = SecretKey::random(&mut rng);
    let server_public = server_secret.public_key().to_encoded_point(false);
    let server_public_raw: [u8; PUBLIC_KEY_LEN] = server_public
        .as_bytes()
        .try_into()
        .map_err(|_| AppError::PushCipher("unexpected ephemeral key length".to_string()))?;

    let shared_secret = p256::ecdh::diffie_hellman(
        server_secret.to_nonzero_scalar(),
        client_public.as_affine(),
    );

    let prk = derive_pseudorandom_key(shared_secret.raw_secret_bytes().as_slice(), auth_secret)?;

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let cek = derive_content_key(&salt, &prk, client_public_raw, &server_public_raw)?;
    let nonce = derive_nonce(&salt, &prk, client_public_raw, &server_public_raw)?;

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| AppError::PushCipher("invalid content key length".to_string()))?;
    let ciphertext = cipher
        .encrypt((&nonce).into(), pad(plaintext).as_slice())
        .map_err(|_| AppError::PushCipher("AES-GCM encryption failed".to_string()))?;

    Ok(build_record_frame(&salt, &server_public_raw, &ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decrypt a record frame from the subscriber's side of the key
    /// agreement — the inverse of `encrypt`, used to prove the wire format
    /// round-trips.
    fn decrypt(
        frame: &[u8],
        client_secret: &SecretKey,
        auth_secret: &[u8; AUTH_SECRET_LEN],
    ) -> Vec<u8> {
        let salt: [u8; SALT_LEN] = frame[..SALT_LEN].try_into().unwrap();
        let record_size = u32::from_be_bytes(frame[16..20].try_into().unwrap());
        assert_eq!(record_size, RECORD_SIZE);
        let key_id_len = frame[20] as usize;
        assert_eq!(key_id_len, PUBLIC_KEY_LEN);
        let server_public_raw: [u8; PUBLIC_KEY_LEN] = frame[21..21 + PUBLIC_KEY_LEN]
            .try_into()
            .unwrap();
        let ciphertext = &frame[21 + PUBLIC_KEY_LEN..];

        let client_public_raw: [u8; PUBLIC_KEY_LEN] = client_secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .unwrap();
        let server_public = PublicKey::from_sec1_bytes(&server_public_raw).unwrap();

        let shared_secret = p256::ecdh::diffie_hellman(
            client_secret.to_nonzero_scalar(),
            server_public.as_affine(),
        );

        let prk =
            derive_pseudorandom_key(shared_secret.raw_secret_bytes().as_slice(), auth_secret)
                .unwrap();
        let cek = derive_content_key(&salt, &prk, &client_public_raw, &server_public_raw).unwrap();
        let nonce = derive_nonce(&salt, &prk, &client_public_raw, &server_public_raw).unwrap();

        let cipher = Aes128Gcm::new_from_slice(&cek).unwrap();
        cipher.decrypt((&nonce).into(), ciphertext).unwrap()
    }

    fn make_subscriber() -> (SecretKey, [u8; PUBLIC_KEY_LEN], [u8; AUTH_SECRET_LEN]) {
        let mut rng = OsRng;
        let secret = SecretKey::random(&mut rng);
        let public: [u8; PUBLIC_KEY_LEN] = secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .unwrap();
        let mut auth = [0u8; AUTH_SECRET_LEN];
        rng.fill_bytes(&mut auth);
        (secret, public, auth)
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let (secret, public, auth) = make_subscriber();
        let plaintext = br#"{"title":"Remesa RM-1 entregada","body":"Entrega completada"}"#;

        let frame = encrypt(plaintext, &public, &auth).unwrap();
        let padded = decrypt(&frame, &secret, &auth);

        assert_eq!(&padded[..padded.len() - 1], plaintext.as_slice());
        assert_eq!(*padded.last().unwrap(), PAD_DELIMITER);
    }

    #[test]
    fn test_frame_layout_and_length() {
        let (_, public, auth) = make_subscriber();
        let plaintext = b"hola";

        let frame = encrypt(plaintext, &public, &auth).unwrap();

        // salt + rs + keyid len + key + (plaintext + pad byte + 16-byte tag)
        assert_eq!(
            frame.len(),
            SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + plaintext.len() + 1 + 16
        );
        assert_eq!(u32::from_be_bytes(frame[16..20].try_into().unwrap()), 4096);
        assert_eq!(frame[20], PUBLIC_KEY_LEN as u8);
        // Uncompressed SEC1 points start with 0x04.
        assert_eq!(frame[21], 0x04);
    }

    #[test]
    fn test_each_message_uses_fresh_salt_and_key() {
        let (_, public, auth) = make_subscriber();
        let a = encrypt(b"x", &public, &auth).unwrap();
        let b = encrypt(b"x", &public, &auth).unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a[21..21 + PUBLIC_KEY_LEN], b[21..21 + PUBLIC_KEY_LEN]);
    }

    #[test]
    fn test_key_info_layout_is_exact() {
        let client = [0x04u8; PUBLIC_KEY_LEN];
        let server = [0x05u8; PUBLIC_KEY_LEN];
        let info = build_key_info("aesgcm", &client, &server);

        let mut expected = Vec::new();
        expected.extend_from_slice(b"Content-Encoding: aesgcm\0P-256\0");
        expected.extend_from_slice(&[0x00, 0x41]);
        expected.extend_from_slice(&client);
        expected.extend_from_slice(&[0x00, 0x41]);
        expected.extend_from_slice(&server);
        assert_eq!(info, expected);
    }

    #[test]
    fn test_prk_info_is_the_auth_label() {
        assert_eq!(PRK_INFO, b"Content-Encoding: auth\0");
    }

    #[test]
    fn test_pad_appends_single_delimiter() {
        assert_eq!(pad(b"abc"), vec![b'a', b'b', b'c', 0x02]);
    }

    #[test]
    fn test_empty_payload_rejected() {
        let (_, public, auth) = make_subscriber();
        assert!(encrypt(b"", &public, &auth).is_err());
    }

    #[test]
    fn test_decode_subscription_keys_round_trip() {
        let (_, public, auth) = make_subscriber();
        let (decoded_public, decoded_auth) =
            decode_subscription_keys(&encode_b64url(&public), &encode_b64url(&auth)).unwrap();
        assert_eq!(decoded_public, public);
        assert_eq!(decoded_auth, auth);
    }

    #[test]
    fn test_decode_subscription_keys_rejects_bad_lengths() {
        assert!(decode_subscription_keys(&encode_b64url(&[0u8; 10]), &encode_b64url(&[0u8; 16]))
            .is_err());
        assert!(decode_subscription_keys(&encode_b64url(&[4u8; 65]), &encode_b64url(&[0u8; 5]))
            .is_err());
    }
}
