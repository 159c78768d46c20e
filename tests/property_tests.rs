use proptest::prelude::*;
use obwt::OnlineRlbwt;

const EM: u8 = 1;

/// O(n^2) mirror of the exact online builder: a flat BWT vector and the
/// implicit marker row.
struct NaiveOnline {
    bwt: Vec<u8>,
    em_pos: usize,
}

impl NaiveOnline {
    fn new() -> Self {
        NaiveOnline {
            bwt: Vec::new(),
            em_pos: 0,
        }
    }

    fn extend(&mut self, ch: u8) {
        let at = self.em_pos;
        self.bwt.insert(at, ch);
        self.em_pos = if ch == EM {
            0
        } else {
            let lt = self.bwt.iter().filter(|&&c| c < ch).count();
            let rank = self.bwt[..=at].iter().filter(|&&c| c == ch).count();
            lt + rank
        };
    }
}

/// Map arbitrary bytes into a small marker-free alphabet; every third
/// character or so becomes the marker to exercise multi-sequence input.
fn to_input(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .map(|&b| if b % 7 == 0 { EM } else { b'a' + b % 4 })
        .collect()
}

proptest! {
    #[test]
    fn test_exact_matches_naive_model(
        raw in prop::collection::vec(any::<u8>(), 1..80),
    ) {
        let input = to_input(&raw);
        let mut b = OnlineRlbwt::new(EM);
        let mut naive = NaiveOnline::new();
        for &ch in &input {
            b.extend(ch);
            naive.extend(ch);
        }
        b.check_integrity();
        prop_assert_eq!(b.len_with_endmarker(), input.len() as u64 + 1);
        prop_assert_eq!(b.end_marker_pos(), naive.em_pos as u64);
        let mut bwt = Vec::new();
        b.write_bwt(&mut bwt, None).unwrap();
        prop_assert_eq!(&bwt, &naive.bwt);

        // Rank agreement against brute force, for every char and row.
        for ch in [b'a', b'b', b'c', b'd', EM] {
            for pos in 0..naive.bwt.len() {
                let expect = naive.bwt[..=pos].iter().filter(|&&c| c == ch).count() as u64;
                prop_assert_eq!(b.drle().rank(ch, pos as u64, false), Some(expect));
            }
        }
    }

    #[test]
    fn test_inversion_roundtrip(
        raw in prop::collection::vec(any::<u8>(), 1..120),
    ) {
        let input = to_input(&raw);
        let mut b = OnlineRlbwt::new(EM);
        for &ch in &input {
            b.extend(ch);
        }
        let mut recovered = Vec::new();
        b.invert(&mut recovered).unwrap();
        prop_assert_eq!(&recovered, &input);
    }

    #[test]
    fn test_run_merge_property(
        raw in prop::collection::vec(any::<u8>(), 1..120),
    ) {
        let input = to_input(&raw);
        let mut b = OnlineRlbwt::new(EM);
        for &ch in &input {
            b.extend(ch);
        }
        let runs: Vec<(u8, u64)> = b.drle().runs().collect();
        let mut total = 0u64;
        for w in runs.windows(2) {
            prop_assert_ne!(w[0].0, w[1].0, "adjacent runs share a character");
        }
        for &(_, w) in &runs {
            prop_assert!(w >= 1);
            total += w;
        }
        prop_assert_eq!(total, input.len() as u64);
    }

    #[test]
    fn test_sap_run_count_never_exceeds_exact(
        raw in prop::collection::vec(any::<u8>(), 1..100),
    ) {
        let mut input = to_input(&raw);
        input.push(EM);
        let mut exact = OnlineRlbwt::new(EM);
        let mut sap = OnlineRlbwt::new(EM);
        for &ch in &input {
            exact.extend(ch);
            sap.sap_extend(ch);
            let iv = sap.sap_interval();
            prop_assert!(iv.s <= iv.e);
            prop_assert!(iv.e < sap.len_with_endmarker());
        }
        sap.check_integrity();
        prop_assert!(sap.num_runs() <= exact.num_runs(),
            "sap produced {} runs, exact {}", sap.num_runs(), exact.num_runs());

        // Same character multiset either way.
        let mut a = Vec::new();
        exact.write_bwt(&mut a, None).unwrap();
        let mut s = Vec::new();
        sap.write_bwt(&mut s, None).unwrap();
        a.sort_unstable();
        s.sort_unstable();
        prop_assert_eq!(a, s);
    }

    #[test]
    fn test_lf_walk_visits_rows_once(
        raw in prop::collection::vec(any::<u8>(), 1..80),
    ) {
        let input = to_input(&raw);
        let mut b = OnlineRlbwt::new(EM);
        for &ch in &input {
            b.extend(ch);
        }
        let mut pos = 0u64;
        let mut seen = std::collections::HashSet::new();
        for _ in 1..b.len_with_endmarker() {
            pos -= (pos > b.end_marker_pos()) as u64;
            prop_assert!(seen.insert(pos), "LF walk revisited row {}", pos);
            let mut p = pos;
            let idx_m = b.drle().search_pos_m(&mut p).unwrap();
            let ch = b.drle().char_from_idx_m(idx_m);
            pos = b.drle().rank_at(ch, idx_m, p, true);
        }
    }
}
