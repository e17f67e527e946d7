#[cfg(test)]
mod unit_tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use sacred_browser::diff::{
        Change,
        ChangeKind,
        TieBreak,
        apply_script,
        coalesce,
        edit_script,
        edit_script_by,
    };

    fn random_sequence(rng: &mut StdRng, max_len: usize, alphabet: u8) -> Vec<u8> {
        let len = rng.random_range(0..=max_len);
        (0..len).map(|_| rng.random_range(0..alphabet)).collect()
    }

    fn check_round_trip(old: &[u8], new: &[u8], tie_break: TieBreak) {
        let script = edit_script_by(old, new, tie_break, |a, b| a == b);
        let mut applied = old.to_vec();
        apply_script(&mut applied, &script);
        assert_eq!(applied, new, "{old:?} -> {new:?} with {tie_break:?}");
        assert!(script.len() <= old.len() + new.len());
        assert_eq!(script.is_empty(), old == new);

        let merged = coalesce(script);
        let mut applied = old.to_vec();
        apply_script(&mut applied, &merged);
        assert_eq!(applied, new);
    }

    #[test]
    fn test_round_trip_random_sequences() {
        println!("== Round Trip ==");

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let old = random_sequence(&mut rng, 12, 5);
            let new = random_sequence(&mut rng, 12, 5);
            check_round_trip(&old, &new, TieBreak::SubstituteFirst);
            check_round_trip(&old, &new, TieBreak::StructuralFirst);
        }

        println!("== Round Trip == success");
    }

    #[test]
    fn test_unique_keys_round_trip() {
        // permutations of unique keys, the shape a reconciler sees
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut old: Vec<u32> = (0..rng.random_range(0..15)).collect();
            let mut new: Vec<u32> = (5..rng.random_range(5..25)).collect();
            for sequence in [&mut old, &mut new] {
                for i in (1..sequence.len()).rev() {
                    let j = rng.random_range(0..=i);
                    sequence.swap(i, j);
                }
            }
            let script = edit_script_by(&old, &new, TieBreak::StructuralFirst, |a, b| a == b);
            let mut applied = old.clone();
            apply_script(&mut applied, &script);
            assert_eq!(applied, new);
        }
    }

    #[test]
    fn test_distance_is_minimal() {
        let cases: [(&str, &str, usize); 6] = [
            ("", "", 0),
            ("abc", "abc", 0),
            ("kitten", "sitting", 3),
            ("", "abcd", 4),
            ("abcd", "", 4),
            ("flaw", "lawn", 2),
        ];
        for (old, new, distance) in cases {
            let old: Vec<char> = old.chars().collect();
            let new: Vec<char> = new.chars().collect();
            assert_eq!(edit_script(&old, &new).len(), distance, "{old:?} -> {new:?}");
        }
    }

    #[test]
    fn test_equal_sequences_give_empty_script() {
        let keys = vec!["a", "b", "c"];
        assert!(edit_script(&keys, &keys).is_empty());
        assert!(edit_script_by(&keys, &keys, TieBreak::StructuralFirst, |a, b| a == b).is_empty());
    }

    #[test]
    fn test_append_to_empty() {
        let script = coalesce(edit_script(&[], &['x', 'y']));
        assert_eq!(script, vec![Change::Insert { position: 0, elements: vec!['x', 'y'] }]);
    }

    #[test]
    fn test_remove_everything() {
        let script = coalesce(edit_script(&['x', 'y', 'z'], &[]));
        assert_eq!(script, vec![Change::Remove { position: 0, count: 3 }]);
        assert_eq!(script[0].kind(), ChangeKind::Remove);
        assert_eq!(script[0].len(), 3);
    }

    #[test]
    fn test_custom_equality() {
        let old = vec!["Alpha", "beta"];
        let new = vec!["alpha", "BETA"];
        let script = edit_script_by(&old, &new, TieBreak::default(), |a, b| a.eq_ignore_ascii_case(b));
        assert!(script.is_empty());
    }

    #[test]
    fn test_positions_refer_to_current_state() {
        // every change is relative to the sequence after the previous one
        let old = vec![1, 2, 3, 4, 5];
        let new = vec![2, 4, 6];
        let script = edit_script_by(&old, &new, TieBreak::StructuralFirst, |a, b| a == b);
        let mut applied = old.clone();
        for change in &script {
            match change {
                Change::Insert { position, .. } => assert!(*position <= applied.len()),
                Change::Remove { position, count } => assert!(position + count <= applied.len()),
                Change::Content { positions, .. } => {
                    assert!(positions.iter().all(|position| *position < applied.len()))
                }
            }
            change.apply(&mut applied);
        }
        assert_eq!(applied, new);
    }
}
