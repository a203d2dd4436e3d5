//! ECB cut-and-paste.
//!
//! ECB blocks can be moved between ciphertexts made under the same key and still decrypt. If we
//! can make one ciphertext end right where the role value starts, and another hold a block that is
//! exactly `admin` plus valid padding, gluing them together makes an admin profile.

use rand::Rng;
use tracing::{debug, instrument};

use crate::{
    bytes_ext::BytesExt,
    cipher::Aes,
    config::AttackConfig,
    error::{Error, Interrupted, Result},
    mode::ecb,
    oracle::Oracle,
    pkcs7,
};

const EMAIL_FIELD: &str = "email=";
const USER_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub email: String,
    pub uid: u32,
    pub role: String,
}

fn strip_separators(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '&' | '=')).collect()
}

impl Profile {
    /// A regular user profile, `profile_for` in the usual telling of this attack.
    pub fn new_user_for_email(email: &str) -> Self {
        Profile {
            email: email.to_owned(),
            uid: 10,
            role: USER_ROLE.to_string(),
        }
    }

    /// `email=...&uid=...&role=...`, in that order. `&` and `=` are dropped from the values, which
    /// keeps fields from being injected but does nothing about block boundaries.
    pub fn encode(&self) -> String {
        format!(
            "{EMAIL_FIELD}{}&uid={}&role={}",
            strip_separators(&self.email),
            self.uid,
            strip_separators(&self.role)
        )
    }

    /// Parse an encoded profile. Values are percent-decoded, unknown keys are ignored.
    pub fn decode(s: &[u8]) -> Result<Self> {
        let mut email = None;
        let mut uid = None;
        let mut role = None;

        for (key, value) in form_urlencoded::parse(s) {
            match key.as_ref() {
                "email" => email = Some(value.into_owned()),
                "uid" => {
                    let parsed = value
                        .parse::<u32>()
                        .map_err(|err| Error::InvalidRecord(format!("uid {value:?}: {err}")))?;
                    uid = Some(parsed);
                }
                "role" => role = Some(value.into_owned()),
                _ => (),
            }
        }

        let missing = |field: &str| Error::InvalidRecord(format!("missing {field}"));
        Ok(Profile {
            email: email.ok_or_else(|| missing("email"))?,
            uid: uid.ok_or_else(|| missing("uid"))?,
            role: role.ok_or_else(|| missing("role"))?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Hands out encrypted user profiles for an email address, under a key it never shares.
pub struct ProfileOracle {
    aes: Aes,
}

impl ProfileOracle {
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(ProfileOracle { aes: Aes::new(key)? })
    }

    pub fn new_random<R: Rng + ?Sized>(rng: &mut R) -> Result<Self> {
        Ok(ProfileOracle {
            aes: Aes::new_random(rng)?,
        })
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Profile> {
        let decrypted = ecb::decrypt(&self.aes, ciphertext)?;
        Profile::decode(pkcs7::unpad(&decrypted, Aes::BLOCK_SIZE)?)
    }
}

impl Oracle<String> for ProfileOracle {
    fn encrypt(&self, email: &String) -> Result<Vec<u8>> {
        let profile = Profile::new_user_for_email(email);
        ecb::encrypt(&self.aes, profile.encode().as_bytes())
    }
}

/// Block size and the length of an encoded profile with an empty email, learned from where the
/// ciphertext grows.
fn measure_record<O: Oracle<String> + ?Sized>(oracle: &O, limit: usize) -> Result<(usize, usize)> {
    let initial_size = oracle.encrypt(&String::new())?.len();

    let mut email = String::new();
    for grown in 1..=limit {
        email.push('A');
        let size = oracle.encrypt(&email)?.len();
        if size != initial_size {
            // the record just filled its last block exactly, so the padding went from `grown`
            // bytes to a whole new block
            return Ok((size - initial_size, initial_size - grown));
        }
    }

    Err(Error::BlockSizeUndetected { limit })
}

/// Forge a ciphertext that `oracle`'s owner decrypts to an admin profile.
#[instrument(skip_all)]
pub fn promote_to_admin<O: Oracle<String> + ?Sized>(
    oracle: &O,
    config: &AttackConfig,
) -> std::result::Result<Vec<u8>, Interrupted> {
    let (block_size, overhead) = measure_record(oracle, config.max_block_size)
        .map_err(|e| Interrupted::new(Vec::new(), e))?;
    let fill = char::from(config.filler);

    // everything up to and including "role=" must end on a block boundary
    let Some(head_len) = overhead.checked_sub(USER_ROLE.len()) else {
        let err = Error::InvalidRecord(format!("{overhead} byte record cannot hold a role"));
        return Err(Interrupted::new(Vec::new(), err));
    };
    let email_len = (block_size - head_len % block_size) % block_size;
    let kept_blocks = (head_len + email_len) / block_size;

    let email = fill.to_string().repeat(email_len);
    let ciphertext = oracle
        .encrypt(&email)
        .map_err(|e| Interrupted::new(Vec::new(), e))?;
    let mut forged = ciphertext[..kept_blocks * block_size].to_vec();
    debug!(email_len, kept_blocks, "cut profile before the role value");

    // an email that starts a new block with "admin" padded out to whole blocks
    let lead = (block_size - EMAIL_FIELD.len() % block_size) % block_size;
    let first_block = (EMAIL_FIELD.len() + lead) / block_size;
    let admin = match pkcs7::pad(b"admin", block_size).map(String::from_utf8) {
        Ok(Ok(admin)) => admin,
        Ok(Err(err)) => {
            let err = Error::InvalidRecord(format!("padding is not text: {err}"));
            return Err(Interrupted::new(forged, err));
        }
        Err(err) => return Err(Interrupted::new(forged, err)),
    };
    let admin_blocks = admin.len() / block_size;

    let email = fill.to_string().repeat(lead) + &admin;
    let ciphertext = match oracle.encrypt(&email) {
        Ok(ciphertext) => ciphertext,
        Err(err) => return Err(Interrupted::new(forged, err)),
    };
    for idx in first_block..first_block + admin_blocks {
        match ciphertext.block(block_size, idx) {
            Some(block) => forged.extend_from_slice(block),
            None => {
                let err = Error::MisalignedInput {
                    len: ciphertext.len(),
                    block_size,
                };
                return Err(Interrupted::new(forged, err));
            }
        }
    }

    debug!(first_block, admin_blocks, "pasted admin block");
    Ok(forged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_encode() {
        let profile = Profile::new_user_for_email("foo@bar.com");
        assert_eq!(profile.encode(), "email=foo@bar.com&uid=10&role=user");
    }

    #[test]
    fn test_encode_strips_separators() {
        let profile = Profile::new_user_for_email("foo@bar.com&role=admin");
        assert_eq!(profile.encode(), "email=foo@bar.comroleadmin&uid=10&role=user");

        let decoded = Profile::decode(profile.encode().as_bytes()).unwrap();
        assert!(!decoded.is_admin());
    }

    #[test]
    fn test_decode() {
        let profile = Profile::decode(b"email=foo%40bar.com&uid=10&role=user&extra=1").unwrap();

        assert_eq!(
            profile,
            Profile {
                email: "foo@bar.com".to_string(),
                uid: 10,
                role: "user".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        assert!(matches!(
            Profile::decode(b"email=a&role=user"),
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            Profile::decode(b"email=a&uid=ten&role=user"),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_oracle_round_trip() {
        let oracle = ProfileOracle::new(b"YELLOW SUBMARINE").unwrap();

        let ciphertext = oracle.encrypt(&"me@example.com".to_string()).unwrap();
        let profile = oracle.decrypt(&ciphertext).unwrap();

        assert_eq!(profile, Profile::new_user_for_email("me@example.com"));
    }

    #[test]
    fn test_measure_record() {
        let oracle = ProfileOracle::new(b"YELLOW SUBMARINE").unwrap();

        let (block_size, overhead) = measure_record(&oracle, 256).unwrap();
        assert_eq!(block_size, 16);
        assert_eq!(overhead, "email=&uid=10&role=user".len());
    }

    #[test]
    fn test_promote_to_admin() {
        let mut rng = StdRng::seed_from_u64(30);

        for _ in 0..5 {
            let oracle = ProfileOracle::new_random(&mut rng).unwrap();

            let forged = promote_to_admin(&oracle, &AttackConfig::default()).unwrap();
            let profile = oracle.decrypt(&forged).unwrap();

            assert!(profile.is_admin(), "{profile:?}");
            assert_eq!(profile.uid, 10);
        }
    }
}
