//! Legacy MD5 password hashing

/// `"md5" + hex(md5(hex(md5(password + user)) + salt))`
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = format!("{}{}", password, user);
    let inner_hex = format!("{:x}", md5::compute(inner.as_bytes()));

    let mut outer = Vec::with_capacity(inner_hex.len() + salt.len());
    outer.extend_from_slice(inner_hex.as_bytes());
    outer.extend_from_slice(salt);

    format!("md5{:x}", md5::compute(&outer))
}
