use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

pub const MIN_SUFFIX_LEN: usize = 4;
pub const MAX_SUFFIX_LEN: usize = 6;

/// Builds `TRK-YYYYMMDD-RRRR-SSSSSS`: creation date, a number in 1000..=9999
/// and an uppercase suffix cut from a random v4 uuid.
pub fn generate(now: DateTime<Utc>, suffix_len: usize) -> String {
    let suffix_len = suffix_len.clamp(MIN_SUFFIX_LEN, MAX_SUFFIX_LEN);
    let number: u16 = rand::thread_rng().gen_range(1000..=9999);
    let suffix = Uuid::new_v4().simple().to_string()[..suffix_len].to_uppercase();

    format!("TRK-{}-{number}-{suffix}", now.format("%Y%m%d"))
}

/// Checks an id against `TRK-\d{8}-\d{4}-[A-Z0-9]{4,6}`.
pub fn is_well_formed(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    let [prefix, date, number, suffix] = parts.as_slice() else {
        return false;
    };

    *prefix == "TRK"
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && number.len() == 4
        && number.bytes().all(|b| b.is_ascii_digit())
        && (MIN_SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&suffix.len())
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::{generate, is_well_formed};

    #[test]
    fn generated_ids_carry_the_creation_date() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let id = generate(now, 6);

        assert!(id.starts_with("TRK-20250307-"));
        assert!(is_well_formed(&id), "{id} is malformed");
    }

    #[test]
    fn suffix_length_is_configurable() {
        let now = Utc::now();

        let short = generate(now, 4);
        assert_eq!(short.rsplit('-').next().unwrap().len(), 4);
        assert!(is_well_formed(&short));

        let clamped = generate(now, 12);
        assert_eq!(clamped.rsplit('-').next().unwrap().len(), 6);
    }

    #[test]
    fn random_number_stays_in_four_digits() {
        let now = Utc::now();
        for _ in 0..500 {
            let id = generate(now, 6);
            let number: u32 = id.split('-').nth(2).unwrap().parse().unwrap();
            assert!((1000..=9999).contains(&number));
        }
    }

    #[test]
    fn ids_rarely_collide() {
        let now = Utc::now();
        let ids: HashSet<String> = (0..1000).map(|_| generate(now, 6)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(!is_well_formed("TRK-2025030-1234-ABCDEF"));
        assert!(!is_well_formed("TRK-20250307-12X4-ABCDEF"));
        assert!(!is_well_formed("TRK-20250307-1234-abcdef"));
        assert!(!is_well_formed("PKG-20250307-1234-ABCDEF"));
        assert!(!is_well_formed("TRK-20250307-1234-ABC"));
        assert!(!is_well_formed("TRK-20250307-1234"));
    }
}
