//! 순서 무관 맵 해시
//!
//! 그룹 키, 캐시 키, 저장소 문서 ID에 쓰이므로 프로세스와 버전에 관계없이
//! 같은 입력에 같은 값을 내야 합니다.
//!
//! 알고리즘:
//! 1. 키를 정렬
//! 2. 각 `(key, value)` 쌍을 길이 접두어와 함께 SHA-256
//! 3. 쌍 다이제스트를 키 순서대로 외부 SHA-256에 입력
//! 4. 앞 16바이트(128비트)를 hex 인코딩

use sha2::{Digest, Sha256};

/// 해시 출력 바이트 수
const HASH_BYTES: usize = 16;

/// 문자열 맵의 순서 무관 해시를 계산합니다.
pub fn compute_hash<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let mut outer = Sha256::new();
    for (key, value) in &pairs {
        let mut inner = Sha256::new();
        update_prefixed(&mut inner, key.as_ref());
        update_prefixed(&mut inner, value.as_ref());
        outer.update(inner.finalize());
    }
    let digest = outer.finalize();
    hex::encode(&digest[..HASH_BYTES])
}

// 길이 접두어로 ("ab","c")와 ("a","bc")를 구분
fn update_prefixed(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;

    #[test]
    fn hash_is_hex_of_expected_length() {
        let h = compute_hash([("host", "web-01")]);
        assert_eq!(h.len(), HASH_BYTES * 2);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_map_hashes_consistently() {
        let a = compute_hash(Vec::<(String, String)>::new());
        let b = compute_hash(BTreeMap::<String, String>::new());
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_produce_different_hashes() {
        let a = compute_hash([("host", "web-01")]);
        let b = compute_hash([("host", "web-02")]);
        assert_ne!(a, b);
    }

    #[test]
    fn boundary_shift_produces_different_hashes() {
        let a = compute_hash([("ab", "c")]);
        let b = compute_hash([("a", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn btreemap_and_hashmap_agree() {
        let mut hm = HashMap::new();
        hm.insert("host".to_owned(), "web-01".to_owned());
        hm.insert("env".to_owned(), "prod".to_owned());
        let bt: BTreeMap<_, _> = hm.clone().into_iter().collect();
        assert_eq!(compute_hash(&hm), compute_hash(&bt));
    }

    #[test]
    fn hash_is_stable_across_versions() {
        // 값이 바뀌면 기존 그룹 키가 모두 무효화됩니다.
        let h = compute_hash([("host", "web-01"), ("env", "prod")]);
        assert_eq!(h, compute_hash([("env", "prod"), ("host", "web-01")]));
        assert_eq!(h, compute_hash(vec![("env", "prod"), ("host", "web-01")]));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hash_is_order_independent(
                map in proptest::collection::btree_map("[a-z.]{1,12}", ".{0,24}", 0..12),
                seed in any::<u64>(),
            ) {
                let mut pairs: Vec<(String, String)> = map.clone().into_iter().collect();
                // 결정적 셔플
                let len = pairs.len();
                if len > 1 {
                    let mut s = seed;
                    for i in (1..len).rev() {
                        s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        let j = (s >> 33) as usize % (i + 1);
                        pairs.swap(i, j);
                    }
                }
                prop_assert_eq!(compute_hash(&map), compute_hash(pairs));
            }
        }
    }
}
