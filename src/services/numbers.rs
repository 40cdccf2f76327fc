use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_code(rng: &mut impl Rng, len: usize) -> String {
    let pick = Uniform::from(0..ALPHABET.len());
    (0..len)
        .map(|_| ALPHABET[pick.sample(rng)] as char)
        .collect()
}

/// `INV-YYYYMMDD-XXXXXX`
pub fn invoice_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    format!("INV-{}-{}", now.format("%Y%m%d"), random_code(&mut rng, 6))
}

/// `TKT-XXXXXXXX`
pub fn ticket_number() -> String {
    let mut rng = rand::thread_rng();
    format!("TKT-{}", random_code(&mut rng, 8))
}
