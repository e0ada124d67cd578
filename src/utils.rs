use statrs::statistics::Statistics;

/// info! that keeps ANSI colours only when the run is displayed in colour
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {
        log::info!("{}", $crate::utils::strip_ansi_if_needed(&format!($($arg)*), $colorful))
    };
}

/// Removes ANSI escape sequences (ESC [ ... letter) unless `colorful` is set
pub fn strip_ansi_if_needed(text: &str, colorful: bool) -> String {
    if colorful {
        return text.to_string();
    }

    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            stripped.push(c);
        }
    }
    stripped
}

/// Mean and population variance (ddof 0) of the finite values, NaN when there are none
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    (finite.iter().mean(), finite.iter().population_variance())
}

/// Sample sizes of an experiment: `init_size + inc_size * step` for step in [0, iters)
pub fn sample_sizes(init_size: usize, inc_size: usize, iters: usize) -> Vec<usize> {
    (0..iters).map(|step| init_size + inc_size * step).collect()
}

/// Index of the largest value, first one on ties
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_if_needed() {
        let text = "\x1b[1;93mSize 30\x1b[0m done";
        assert_eq!(strip_ansi_if_needed(text, false), "Size 30 done");
        assert_eq!(strip_ansi_if_needed(text, true), text);
    }

    #[test]
    fn test_mean_and_variance_ignores_nan() {
        let (mean, var) = mean_and_variance(&[1.0, f64::NAN, 0.0, 1.0, 0.0]);
        assert!((mean - 0.5).abs() < 1e-12);
        assert!((var - 0.25).abs() < 1e-12);

        let (mean, var) = mean_and_variance(&[f64::NAN]);
        assert!(mean.is_nan() && var.is_nan());
    }

    #[test]
    fn test_sample_sizes_arithmetic_progression() {
        assert_eq!(sample_sizes(30, 5, 4), vec![30, 35, 40, 45]);
        assert!(sample_sizes(30, 5, 0).is_empty());
    }

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
