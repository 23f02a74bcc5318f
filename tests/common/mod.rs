#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HEADER: &str = "date,sitename,county,aqi,pollutant,status,so2,co,o3,o3_8hr,pm10,pm2.5,no2,nox,no,windspeed,winddirec,unit,co_8hr,pm2.5_avg,pm10_avg,so2_avg,longitude,latitude,siteid";

const STATIONS: [(&str, &str, f64, f64); 4] = [
    ("Keelung", "Keelung City", 121.760056, 25.129167),
    ("Xizhi", "New Taipei City", 121.6423, 25.067131),
    ("Zhongshan", "Taipei City", 121.526528, 25.062361),
    ("Hualien", "Hualien County", 121.599769, 23.971306),
];

/// One well-formed row for `station` at `timestamp` with the given aqi text.
pub fn row(station: usize, timestamp: &str, aqi: &str) -> String {
    let (site, county, lon, lat) = STATIONS[station % STATIONS.len()];
    format!(
        "{timestamp},{site},{county},{aqi},PM2.5,Moderate,1.2,0.25,31,29,42,18,12.5,14,1.5,2.1,240,,0.3,16,38,1.1,{lon},{lat},{}",
        station % STATIONS.len() + 1
    )
}

/// Hourly rows starting at 2024-07-31 20:00, so the set spans two calendar months.
pub fn hourly_rows(count: usize) -> Vec<String> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 7, 31)
        .unwrap()
        .and_hms_opt(20, 0, 0)
        .unwrap();
    (0..count)
        .map(|i| {
            let ts = start + chrono::Duration::hours((i / STATIONS.len()) as i64);
            let aqi = format!("{}", 20 + (i * 7) % 130);
            row(i, &ts.format("%Y-%m-%d %H:%M").to_string(), &aqi)
        })
        .collect()
}

pub fn write_source(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("air_quality.csv");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file.flush().unwrap();
    path
}
