/// A quantile that has both the raw value and a Graphite-friendly display label.
///
/// We work with quantiles for optimal floating-point precison over percentiles, but the metric paths we emit use the
/// familiar percentile form, with any decimal point dropped: a quantile of `0.99` is labeled `99percentile`, and a
/// quantile of `0.999` is labeled `999percentile`.
///
/// The one special case is `0.5`, which is labeled `median`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantile(f64, String);

impl Quantile {
    /// Creates a new [`Quantile`] from a floating-point value.
    ///
    /// All values are clamped between 0.0 and 1.0.
    pub fn new(quantile: f64) -> Quantile {
        let clamped = quantile.clamp(0.0, 1.0);
        let display = clamped * 100.0;

        let label = if clamped == 0.5 {
            "median".to_string()
        } else {
            let raw = format!("{}percentile", display);
            raw.replace('.', "")
        };

        Quantile(clamped, label)
    }

    /// Gets the display label.
    pub fn label(&self) -> &str {
        self.1.as_str()
    }

    /// Gets the raw quantile value.
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Parses a slice of floating-point values into a vector of [`Quantile`]s.
pub fn parse_quantiles(quantiles: &[f64]) -> Vec<Quantile> {
    quantiles.iter().map(|f| Quantile::new(*f)).collect()
}
