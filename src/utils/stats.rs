use serde::Serialize;

/// Descriptive fingerprint of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); `None` with fewer than two values.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
}

/// Describe the values; sorts `values` in place. Returns `None` when empty.
pub fn describe(values: &mut [f64]) -> Option<DescriptiveStats> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 1 {
        values[count / 2]
    } else {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    };
    let std_dev = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        Some(variance.sqrt())
    } else {
        None
    };

    Some(DescriptiveStats {
        count,
        mean,
        median,
        std_dev,
        min: values[0],
        max: values[count - 1],
    })
}

/// Streaming min/max over values seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningRange {
    bounds: Option<(f64, f64)>,
}

impl RunningRange {
    pub fn update(&mut self, value: f64) {
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }
}

/// `numerator / denominator`, or `None` when the denominator is not positive.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_odd_count() {
        let mut values = vec![3.0, 1.0, 2.0];
        let stats = describe(&mut values).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.median, 2.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert!((stats.std_dev.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_describe_even_count_and_single() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(describe(&mut values).unwrap().median, 2.5);

        let mut single = vec![7.0];
        let stats = describe(&mut single).unwrap();
        assert_eq!(stats.std_dev, None);
        assert_eq!(stats.median, 7.0);

        assert!(describe(&mut []).is_none());
    }

    #[test]
    fn test_running_range() {
        let mut range = RunningRange::default();
        assert_eq!(range.bounds(), None);
        for v in [5.0, -1000.0, 42.0] {
            range.update(v);
        }
        assert_eq!(range.bounds(), Some((-1000.0, 42.0)));
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(10.0, 4.0), Some(2.5));
        assert_eq!(ratio(10.0, 0.0), None);
    }
}
