use cordyceps_avl::AvlMap;

fn main() {
    let mut map: AvlMap<u32, &str> = AvlMap::new();

    for (key, value) in [(2, "two"), (0, "zero"), (3, "three"), (1, "one")] {
        map.insert(key, value).expect("keys are distinct");
        map.assert_invariants();
        println!("{:?}", map.iter().map(|(&k, _)| k).collect::<Vec<_>>());
    }

    // Appending at the maximum stays near the finger.
    for (key, value) in [(4, "four"), (5, "five"), (6, "six")] {
        let metrics = map.finger_insert(key, value).expect("keys are distinct");
        println!("finger insert {key}: {metrics:?}");
    }

    let (found, edges) = map.finger_search(&6);
    println!("finger search 6 -> {found:?} after {edges} nodes");

    let (left, right, pair) = map.split(&3).ok().expect("3 is present");
    println!(
        "split at {}: {:?} | {:?}",
        pair.0,
        left.iter().map(|(&k, _)| k).collect::<Vec<_>>(),
        right.iter().map(|(&k, _)| k).collect::<Vec<_>>(),
    );

    let mut rejoined = left;
    rejoined.join(right, pair.0, pair.1);
    rejoined.assert_invariants();
    println!(
        "rejoined: {:?}",
        rejoined.iter().map(|(&k, _)| k).collect::<Vec<_>>()
    );

    let zero = rejoined.pop_first().expect("map is not empty");
    assert_eq!(zero, (0, "zero"));
    rejoined.assert_invariants();

    drop(rejoined);
}
