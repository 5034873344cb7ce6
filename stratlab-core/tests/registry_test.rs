//! Registry integrity and built-in catalog smoke tests.

use chrono::NaiveDate;
use std::collections::HashSet;

use stratlab_core::composition::Composer;
use stratlab_core::domain::{Bar, DataSources, DatedTable, PriceSeries};
use stratlab_core::params::ParamValue;
use stratlab_core::signals::{SignalInputs, SignalRegistry};
use stratlab_core::{Side, SignalConfig};

fn series(code: &str, n: usize, phase: f64) -> PriceSeries {
    let base = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let bars = (0..n)
        .map(|i| {
            let t = i as f64;
            let c = 100.0 + (t * 0.07 + phase).sin() * 12.0 + t * 0.05;
            Bar {
                date: base + chrono::Duration::days(i as i64),
                open: c - 0.4,
                high: c + 1.5,
                low: c - 1.5,
                close: c,
                volume: 1000.0 + (t * 0.5).cos().abs() * 800.0,
            }
        })
        .collect();
    PriceSeries::new(code, bars)
}

fn full_sources(prices: &PriceSeries) -> DataSources {
    let dates = prices.dates();
    let quarterly: Vec<NaiveDate> = dates.iter().step_by(63).copied().collect();
    let eps = quarterly.iter().enumerate().map(|(i, _)| 6.0 + i as f64).collect();
    let weekly: Vec<NaiveDate> = dates.iter().step_by(5).copied().collect();
    let ratio = (0..weekly.len())
        .map(|i| 1.0 + (i as f64 * 0.3).sin())
        .collect();
    DataSources {
        benchmark: Some(series("INDEX", prices.len(), 0.5)),
        sector: Some(series("SECTOR", prices.len(), 1.0)),
        statements: Some(DatedTable::new(quarterly).with_column("EPS", eps)),
        margin: Some(DatedTable::new(weekly).with_column("margin_ratio", ratio)),
    }
}

#[test]
fn builtin_registry_builds() {
    let registry = SignalRegistry::builtin().unwrap();
    assert_eq!(registry.len(), 14);
}

#[test]
fn names_are_unique() {
    let registry = SignalRegistry::builtin().unwrap();
    let names: HashSet<&str> = registry.names().collect();
    assert_eq!(names.len(), registry.len());
}

#[test]
fn every_ranged_parameter_exists_in_defaults_and_lies_in_range() {
    let registry = SignalRegistry::builtin().unwrap();
    for def in registry.definitions() {
        for side in Side::ALL {
            if !def.usable_on(side) {
                continue;
            }
            let params = def.default_params(side);
            for (path, range) in &def.param_ranges {
                let value = params
                    .number(path)
                    .unwrap_or_else(|| panic!("{}.{path} missing from defaults", def.name));
                // Overrides may narrow the range below the schema default;
                // clamping must still land inside it.
                assert!(range.contains(range.clamp(value)), "{}.{path}", def.name);
            }
        }
    }
}

#[test]
fn categoricals_are_not_searchable() {
    let registry = SignalRegistry::builtin().unwrap();
    for def in registry.definitions() {
        let params = def.default_params(Side::Entry);
        for path in def.param_ranges.keys() {
            assert!(matches!(params.get(path), Some(ParamValue::Number(_))));
        }
    }
}

#[test]
fn every_signal_evaluates_with_defaults_on_full_data() {
    let registry = SignalRegistry::builtin().unwrap();
    let prices = series("7203", 300, 0.0);
    let sources = full_sources(&prices);
    let inputs = SignalInputs::new(&prices, &sources, false);
    let composer = Composer::new(&registry);

    for def in registry.definitions() {
        for side in Side::ALL {
            if !def.usable_on(side) {
                continue;
            }
            let mut config = SignalConfig::new();
            config.insert(def.name.clone(), def.default_params(side));
            let (entry, exit) = match side {
                Side::Entry => (config, SignalConfig::new()),
                Side::Exit => (SignalConfig::new(), config),
            };
            let out = composer.compose(&entry, &exit, &inputs).unwrap();
            assert_eq!(
                out.report.applied_on(side),
                vec![def.name.as_str()],
                "{} on {side}: {:?}",
                def.name,
                out.report.skipped
            );
            assert_eq!(out.entry.len(), prices.len());
        }
    }
}
