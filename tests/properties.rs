use proptest::prelude::*;
use vehicle_trends::analysis::index::normalize_to_base;
use vehicle_trends::data::clean::Cleaner;
use vehicle_trends::{FuelCategory, Market, VehicleRecord, YearRange};

fn metric() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(1.0f64..2000.0)
}

fn sports_record() -> impl Strategy<Value = VehicleRecord> {
    (
        2014i32..=2023,
        "[A-Z][a-z]{2,10}",
        prop::option::of("[A-Z0-9][a-z0-9]{0,6}"),
        50.0f64..1500.0,
        metric(),
        metric(),
        prop::option::of(1.5f64..12.0),
        any::<bool>(),
    )
        .prop_map(|(year, make, model, hp, disp, price, accel, electric)| VehicleRecord {
            market: Market::Sports,
            year,
            manufacturer: make,
            model,
            horsepower: Some(hp),
            engine_displacement_l: disp,
            price_usd: price,
            accel_0_60_s: accel,
            combined_mpg: None,
            co2_g_per_mi: None,
            fuel_type_category: if electric { FuelCategory::Electric } else { FuelCategory::Gasoline },
        })
}

fn epa_record() -> impl Strategy<Value = VehicleRecord> {
    (
        2000i32..=2024,
        "[A-Z][a-z]{2,10}",
        prop::option::of("[A-Z][a-z]{2,8}"),
        prop::option::of(5.0f64..150.0),
        metric(),
        prop::option::of(0.8f64..8.0),
        50.0f64..800.0,
        any::<bool>(),
    )
        .prop_map(|(year, make, model, mpg, co2, disp, hp, electric)| VehicleRecord {
            market: Market::Epa,
            year,
            manufacturer: make,
            model,
            horsepower: Some(hp),
            engine_displacement_l: disp,
            price_usd: None,
            accel_0_60_s: None,
            combined_mpg: mpg,
            co2_g_per_mi: co2,
            fuel_type_category: if electric { FuelCategory::Electric } else { FuelCategory::Gasoline },
        })
}

proptest! {
    #[test]
    fn prop_sports_cleaning_is_idempotent(record in sports_record()) {
        let cleaner = Cleaner::new(Market::Sports, YearRange::new(2014, 2023));
        let once = cleaner.clean_row(&record.to_raw_row()).unwrap();
        prop_assert_eq!(&once, &record);
        let twice = cleaner.clean_row(&once.to_raw_row()).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn prop_epa_cleaning_is_idempotent(record in epa_record()) {
        let cleaner = Cleaner::new(Market::Epa, YearRange::new(2000, 2024));
        let once = cleaner.clean_row(&record.to_raw_row()).unwrap();
        prop_assert_eq!(&once, &record);
        let twice = cleaner.clean_row(&once.to_raw_row()).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn prop_normalization_round_trip(
        base in 0.5f64..10_000.0,
        rest in prop::collection::vec(prop::option::of(0.0f64..10_000.0), 0..20),
    ) {
        let mut series = vec![(2000, Some(base))];
        series.extend(rest.iter().enumerate().map(|(i, v)| (2001 + i as i32, *v)));

        let index = normalize_to_base("prop", &series, None).unwrap();
        prop_assert_eq!(index.base_year, 2000);
        prop_assert!((index.value_at(2000).unwrap() - 100.0).abs() < 1e-9);

        for ((year, original), (y2, restored)) in series.iter().zip(index.denormalize()) {
            prop_assert_eq!(*year, y2);
            match (original, restored) {
                (Some(a), Some(b)) => prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0)),
                (None, None) => {}
                other => prop_assert!(false, "null mismatch: {:?}", other),
            }
        }
    }
}
