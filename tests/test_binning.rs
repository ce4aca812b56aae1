use cinder::grid::{MicroTileScheme, linear_bin_to_micro_macro};
use std::collections::HashSet;

#[test]
fn test_global_scheme_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let scheme = MicroTileScheme::new(3240, 18, 18, 180, 180).expect("Failed to create scheme");
    let num_bins = scheme.num_bins();
    println!("Checking round trip over {} bins", num_bins);

    let mut bin = 0;
    let mut checked = 0;
    while bin < num_bins {
        let address = scheme.bin_address(bin).expect("Bin inside domain");
        assert!(address.tile_x < 3240 / 18);
        assert!(address.tile_y < 6480 / 18);
        assert_eq!(address.macro_tile_x, address.tile_x / 10);
        assert_eq!(address.macro_tile_y, address.tile_y / 10);
        assert_eq!(scheme.bin_index(&address).expect("Valid address"), bin);
        bin += 9973;
        checked += 1;
    }

    let last = scheme.bin_address(num_bins - 1).expect("Last bin");
    assert_eq!(scheme.bin_index(&last).unwrap(), num_bins - 1);
    assert!(checked > 2000);
}

#[test]
fn test_reduced_scheme_is_bijective() {
    let scheme = MicroTileScheme::new(36, 3, 3, 9, 9).expect("Failed to create scheme");

    let mut seen = HashSet::new();
    for bin in 0..scheme.num_bins() {
        let address = linear_bin_to_micro_macro(&scheme, bin).expect("Bin inside domain");
        assert!(seen.insert(address), "address of bin {} repeated", bin);
        assert_eq!(scheme.bin_index(&address).unwrap(), bin);
    }
    assert_eq!(seen.len() as u64, 36 * 72);

    // each micro tile holds exactly micro_w x micro_h bins
    let groups = scheme.partition(0..scheme.num_bins()).unwrap();
    assert_eq!(groups.len(), (36 / 3) * (72 / 3));
    assert!(groups.values().all(|bins| bins.len() == 9));
}

#[test]
fn test_column_major_orientation() {
    let scheme = MicroTileScheme::new(36, 3, 3, 9, 9).unwrap();

    // consecutive bins walk along a row of num_rows_global bins
    let a = scheme.bin_address(0).unwrap();
    let b = scheme.bin_address(35).unwrap();
    let c = scheme.bin_address(36).unwrap();
    assert_eq!((a.tile_y, a.tile_x), (0, 0));
    assert_eq!((b.tile_y, b.tile_x), (0, 11));
    assert_eq!((c.tile_y, c.tile_x, c.offset_y), (0, 0, 1));
}
