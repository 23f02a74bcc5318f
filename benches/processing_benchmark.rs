use airq_pipeline::models::cast::{cast_f32, parse_timestamp};
use airq_pipeline::models::SchemaPolicy;
use airq_pipeline::processors::{BatchBuilder, StreamingConverter};
use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use csv::StringRecord;
use std::io::Write;
use tempfile::TempDir;

const HEADER: &str = "date,sitename,county,aqi,pollutant,status,so2,co,o3,o3_8hr,pm10,pm2.5,no2,nox,no,windspeed,winddirec,unit,co_8hr,pm2.5_avg,pm10_avg,so2_avg,longitude,latitude,siteid";

const SITES: [(&str, &str); 3] = [
    ("Keelung", "Keelung City"),
    ("Banqiao", "New Taipei City"),
    ("Hualien", "Hualien County"),
];

// Synthetic hourly rows spanning a year boundary, with a sprinkling of null tokens.
fn create_rows(count: usize) -> Vec<String> {
    let start = NaiveDate::from_ymd_opt(2023, 12, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    (0..count)
        .map(|i| {
            let (site, county) = SITES[i % SITES.len()];
            let ts = start + Duration::hours((i / SITES.len()) as i64);
            let aqi = if i % 17 == 0 {
                "-".to_string()
            } else {
                format!("{}", 15 + i % 180)
            };
            format!(
                "{},{site},{county},{aqi},PM2.5,Moderate,1.1,0.3,28,30,40,{},11,13,1.2,2.4,200,,0.3,15,36,1.0,121.5,24.8,{}",
                ts.format("%Y-%m-%d %H:%M"),
                i % 60,
                i % SITES.len() + 1
            )
        })
        .collect()
}

fn create_records(count: usize) -> (StringRecord, Vec<StringRecord>) {
    let header = StringRecord::from(HEADER.split(',').collect::<Vec<_>>());
    let records = create_rows(count)
        .iter()
        .map(|line| StringRecord::from(line.split(',').collect::<Vec<_>>()))
        .collect();
    (header, records)
}

fn benchmark_cell_casts(c: &mut Criterion) {
    let cells = ["42.5", "", "-", "NA", "1e3", "abc", "0.0", "999"];
    let stamps = ["2024-08-01 10:00", "2024-08-01T10:00:00", "08/01/2024 10:00", "bad"];

    c.bench_function("cell_casts", |b| {
        b.iter(|| {
            let floats = cells
                .iter()
                .copied()
                .filter(|cell| !cast_f32(Some(*cell)).is_missing())
                .count();
            let stamps = stamps
                .iter()
                .copied()
                .filter(|stamp| !parse_timestamp(Some(*stamp)).is_missing())
                .count();
            black_box(floats + stamps)
        })
    });
}

fn benchmark_batch_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_builder_by_chunk");

    for &size in &[1_000, 10_000, 50_000] {
        let (header, records) = create_records(size);
        let schema = SchemaPolicy::air_quality().resolve(&header);
        let builder = BatchBuilder::new(schema);

        group.bench_with_input(BenchmarkId::new("rows", size), &records, |b, records| {
            b.iter(|| {
                let batches = builder.build(records).unwrap();
                black_box(batches.total_rows())
            })
        });
    }
    group.finish();
}

fn benchmark_conversion(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("air_quality.csv");
    let mut file = std::fs::File::create(&source).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for line in create_rows(20_000) {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();

    let mut group = c.benchmark_group("conversion");
    group.sample_size(10);

    for &chunk_size in &[2_000, 20_000] {
        group.bench_with_input(
            BenchmarkId::new("chunk_size", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                let output = temp.path().join(format!("store-{}", chunk_size));
                b.iter(|| {
                    let summary = StreamingConverter::new(&source, &output, chunk_size)
                        .unwrap()
                        .convert(None)
                        .unwrap();
                    black_box(summary.files_written)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_cell_casts,
    benchmark_batch_builder,
    benchmark_conversion
);
criterion_main!(benches);
