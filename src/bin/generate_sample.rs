use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vehicle_trends::data::model::{epa_cols, sports_cols};

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(1e-15);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

// ---------------------------------------------------------------------------
// Sports table
// ---------------------------------------------------------------------------

/// (make, model, base hp, litres, base 0-60, base price)
const SPORTS_LINEUP: &[(&str, &str, f64, f64, f64, f64)] = &[
    ("Porsche", "911", 380.0, 3.0, 4.0, 99_000.0),
    ("Porsche", "Cayman", 300.0, 2.0, 4.9, 60_000.0),
    ("Ferrari", "F8 Tributo", 710.0, 3.9, 2.9, 276_000.0),
    ("Lamborghini", "Huracan", 610.0, 5.2, 3.1, 208_000.0),
    ("Chevrolet", "Corvette", 460.0, 6.2, 3.8, 60_000.0),
    ("BMW", "M4", 425.0, 3.0, 4.1, 72_000.0),
    ("Nissan", "GT-R", 565.0, 3.8, 2.9, 113_000.0),
    ("Ford", "Mustang GT", 450.0, 5.0, 4.3, 37_000.0),
];

struct SportsRow {
    make: &'static str,
    model: &'static str,
    year: i32,
    engine: String,
    horsepower: String,
    accel: String,
    price: String,
}

fn sports_rows(rng: &mut StdRng) -> Vec<SportsRow> {
    let mut rows = Vec::new();
    for year in 2014..=2023 {
        let drift = (year - 2014) as f64;
        for &(make, model, hp, litres, accel, price) in SPORTS_LINEUP {
            let hp = hp * (1.0 + 0.015 * drift) + gauss(rng, 0.0, 10.0);
            let accel = (accel - 0.03 * drift + gauss(rng, 0.0, 0.05)).max(2.0);
            let price = price * (1.0 + 0.03 * drift) + gauss(rng, 0.0, 1500.0);
            rows.push(SportsRow {
                make,
                model,
                year,
                engine: format!("{litres:.1}"),
                horsepower: format!("{hp:.0}"),
                accel: format!("{accel:.1}"),
                price: format!("{:.0}", price.max(20_000.0)),
            });
        }
        if year >= 2017 {
            let drift = (year - 2017) as f64;
            rows.push(SportsRow {
                make: "Tesla",
                model: "Model S Plaid",
                year,
                engine: "Electric".to_string(),
                horsepower: format!("{:.0}", 760.0 + 40.0 * drift),
                accel: format!("{:.1}", (2.6 - 0.1 * drift).max(2.0)),
                price: format!("{:.0}", 90_000.0 + 2_000.0 * drift),
            });
        }
    }

    // A few rows the cleaner should reject.
    let bad = |year: i32, hp: &str| SportsRow {
        make: "Lotus",
        model: "Evora",
        year,
        engine: "3.5".to_string(),
        horsepower: hp.to_string(),
        accel: "4.1".to_string(),
        price: "96,950".to_string(),
    };
    rows.push(bad(2011, "400"));
    rows.push(bad(2019, "lots"));
    rows
}

fn write_sports_csv(path: &Path, rows: &[SportsRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating sports CSV")?;
    writer.write_record([
        sports_cols::MAKE,
        sports_cols::MODEL,
        sports_cols::YEAR,
        sports_cols::ENGINE_SIZE,
        sports_cols::HORSEPOWER,
        sports_cols::ACCEL,
        sports_cols::PRICE,
    ])?;
    for r in rows {
        let year = r.year.to_string();
        writer.write_record([
            r.make,
            r.model,
            year.as_str(),
            r.engine.as_str(),
            r.horsepower.as_str(),
            r.accel.as_str(),
            r.price.as_str(),
        ])?;
    }
    writer.flush().context("flushing sports CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// EPA table
// ---------------------------------------------------------------------------

/// (make, model, base hp, litres, base mpg)
const EPA_LINEUP: &[(&str, &str, f64, f64, f64)] = &[
    ("Honda", "Civic", 140.0, 1.8, 30.0),
    ("Toyota", "Camry", 170.0, 2.5, 27.0),
    ("Ford", "F150 Pickup 2WD", 280.0, 5.0, 17.0),
    ("Chevrolet", "Malibu", 160.0, 2.4, 26.0),
    ("Subaru", "Outback", 175.0, 2.5, 24.0),
    ("BMW", "330i", 240.0, 2.0, 27.0),
    ("Porsche", "Macan", 250.0, 2.0, 21.0),
];

/// (make, model, first year)
const EV_LINEUP: &[(&str, &str, i32)] = &[
    ("Nissan", "Leaf", 2011),
    ("Tesla", "Model 3", 2017),
    ("Chevrolet", "Bolt EV", 2017),
    ("Hyundai", "Kona Electric", 2019),
    ("Ford", "Mustang Mach-E", 2021),
];

#[derive(Default)]
struct EpaColumns {
    make: Vec<String>,
    model: Vec<String>,
    year: Vec<i64>,
    fuel: Vec<String>,
    mpg: Vec<Option<f64>>,
    co2: Vec<Option<f64>>,
    displacement: Vec<Option<f64>>,
    horsepower: Vec<Option<f64>>,
}

impl EpaColumns {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        make: &str,
        model: &str,
        year: i32,
        fuel: &str,
        mpg: Option<f64>,
        co2: Option<f64>,
        displacement: Option<f64>,
        horsepower: Option<f64>,
    ) {
        self.make.push(make.to_string());
        self.model.push(model.to_string());
        self.year.push(year as i64);
        self.fuel.push(fuel.to_string());
        self.mpg.push(mpg);
        self.co2.push(co2);
        self.displacement.push(displacement);
        self.horsepower.push(horsepower);
    }

    fn len(&self) -> usize {
        self.year.len()
    }
}

fn epa_rows(rng: &mut StdRng) -> EpaColumns {
    let mut cols = EpaColumns::default();
    for year in 2000..=2024 {
        let drift = (year - 2000) as f64;
        for &(make, model, hp, litres, mpg) in EPA_LINEUP {
            let fuel = if make == "BMW" || make == "Porsche" { "Premium" } else { "Regular" };
            let mpg = (mpg * (1.0 + 0.012 * drift) + gauss(rng, 0.0, 0.8)).round();
            let co2 = (8887.0 / mpg).round();
            let hp = (hp * (1.0 + 0.01 * drift) + gauss(rng, 0.0, 5.0)).round();
            cols.push(make, model, year, fuel, Some(mpg), Some(co2), Some(litres), Some(hp));
        }
        for &(make, model, first) in EV_LINEUP {
            if year < first {
                continue;
            }
            let age = (year - first) as f64;
            let mpge = (110.0 + 2.0 * age + gauss(rng, 0.0, 3.0)).round();
            let hp = (150.0 + 15.0 * age + gauss(rng, 0.0, 10.0)).round();
            cols.push(make, model, year, "Electricity", Some(mpge), Some(0.0), None, Some(hp));
        }
    }

    // Rows the cleaner should reject: unknown fuel, year before the range.
    cols.push("Toyota", "Mirai", 2020, "Hydrogen", Some(66.0), Some(0.0), None, Some(151.0));
    cols.push("Honda", "Civic", 1998, "Regular", Some(32.0), Some(280.0), Some(1.6), Some(106.0));
    cols
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn write_epa_csv(path: &Path, cols: &EpaColumns) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .context("creating EPA CSV")?;
    writer.write_record([
        epa_cols::MAKE,
        epa_cols::MODEL,
        epa_cols::YEAR,
        epa_cols::FUEL_TYPE,
        epa_cols::COMBINED_MPG,
        epa_cols::CO2,
        epa_cols::DISPLACEMENT,
        epa_cols::HORSEPOWER,
    ])?;
    for i in 0..cols.len() {
        writer.write_record([
            cols.make[i].clone(),
            cols.model[i].clone(),
            cols.year[i].to_string(),
            cols.fuel[i].clone(),
            opt(cols.mpg[i]),
            opt(cols.co2[i]),
            opt(cols.displacement[i]),
            opt(cols.horsepower[i]),
        ])?;
    }
    writer.flush().context("flushing EPA CSV")?;
    Ok(())
}

fn write_epa_parquet(path: &Path, cols: &EpaColumns) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(epa_cols::MAKE, DataType::Utf8, false),
        Field::new(epa_cols::MODEL, DataType::Utf8, false),
        Field::new(epa_cols::YEAR, DataType::Int64, false),
        Field::new(epa_cols::FUEL_TYPE, DataType::Utf8, false),
        Field::new(epa_cols::COMBINED_MPG, DataType::Float64, true),
        Field::new(epa_cols::CO2, DataType::Float64, true),
        Field::new(epa_cols::DISPLACEMENT, DataType::Float64, true),
        Field::new(epa_cols::HORSEPOWER, DataType::Float64, true),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(cols.make.clone())),
            Arc::new(StringArray::from(cols.model.clone())),
            Arc::new(Int64Array::from(cols.year.clone())),
            Arc::new(StringArray::from(cols.fuel.clone())),
            Arc::new(Float64Array::from(cols.mpg.clone())),
            Arc::new(Float64Array::from(cols.co2.clone())),
            Arc::new(Float64Array::from(cols.displacement.clone())),
            Arc::new(Float64Array::from(cols.horsepower.clone())),
        ],
    )
    .context("building EPA record batch")?;

    let file = std::fs::File::create(path).context("creating EPA parquet")?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(42);

    let sports = sports_rows(&mut rng);
    let sports_path = out_dir.join("sports_cars.csv");
    write_sports_csv(&sports_path, &sports)?;
    println!("Wrote {} sports rows to {}", sports.len(), sports_path.display());

    let epa = epa_rows(&mut rng);
    let csv_path = out_dir.join("epa_vehicles.csv");
    let parquet_path = out_dir.join("epa_vehicles.parquet");
    write_epa_csv(&csv_path, &epa)?;
    write_epa_parquet(&parquet_path, &epa)?;
    println!(
        "Wrote {} EPA rows to {} and {}",
        epa.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
