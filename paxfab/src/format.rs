// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Numeric parsing and display helpers shared by the subcommands.

/// Parses an unsigned integer with the base inferred from its prefix:
/// `0x` for hex, a leading `0` for octal, decimal otherwise.
pub fn parse_auto(s: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        u64::from_str_radix(&s[1..], 8)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid integer {s:?}: {e}"))
}

macro_rules! parse_fns {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            pub fn $name(s: &str) -> Result<$ty, String> {
                let v = parse_auto(s)?;
                <$ty>::try_from(v).map_err(|_| {
                    format!("value {s:?} out of range for a {}-bit field", <$ty>::BITS)
                })
            }
        )*
    };
}

parse_fns! {
    parse_u8 -> u8,
    parse_u16 -> u16,
    parse_u32 -> u32,
    parse_u64 -> u64,
}

/// SI magnitudes from peta down to femto, largest first.
const SI_SUFFIXES: [(f64, &str); 11] = [
    (1e15, "P"),
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "M"),
    (1e3, "k"),
    (1e0, ""),
    (1e-3, "m"),
    (1e-6, "u"),
    (1e-9, "n"),
    (1e-12, "p"),
    (1e-15, "f"),
];

/// Scales a value into the first SI magnitude it meets or exceeds.
pub fn si_scale(val: f64) -> (f64, &'static str) {
    for (magnitude, suffix) in SI_SUFFIXES {
        if val >= magnitude {
            return (val / magnitude, suffix);
        }
    }
    (val, "")
}

/// Formats with three significant digits, trailing zeros trimmed.
pub fn sig3(val: f64) -> String {
    if val == 0.0 || !val.is_finite() {
        return format!("{val}");
    }
    let exponent = val.abs().log10().floor() as i32;
    let decimals = (2 - exponent).max(0) as usize;
    let s = format!("{val:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Rate line used by the bandwidth report.
pub fn print_rate(msg: &str, time_us: u64, total: u64) {
    let rate = total as f64 / (time_us as f64 * 1e-6);
    let (rate, suffix) = si_scale(rate);
    println!("\t{msg:<8}\t{:>5} {suffix}B/s", sig3(rate));
}

/// Dumps a buffer as hex, sixteen bytes per line with a mid-line gap.
pub fn hexdump(buf: &[u8]) {
    for (i, b) in buf.iter().enumerate() {
        if i % 16 == 0 {
            print!("\n{i:08x}: ");
        }
        if i % 8 == 0 {
            print!(" ");
        }
        print!("{b:02x}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_base_parsing() {
        assert_eq!(parse_auto("0x3300").unwrap(), 0x3300);
        assert_eq!(parse_auto("0X1f").unwrap(), 0x1f);
        assert_eq!(parse_auto("017").unwrap(), 0o17);
        assert_eq!(parse_auto("42").unwrap(), 42);
        assert_eq!(parse_auto("0").unwrap(), 0);
        assert!(parse_auto("0xzz").is_err());
        assert!(parse_auto("").is_err());
    }

    #[test]
    fn width_limits_enforced() {
        assert_eq!(parse_u16("0xffff").unwrap(), 0xffff);
        assert!(parse_u16("0x10000").is_err());
        assert_eq!(parse_u8("255").unwrap(), 255);
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn si_scaling_picks_first_magnitude() {
        assert_eq!(si_scale(2.5e9), (2.5, "G"));
        assert_eq!(si_scale(999.0), (999.0, ""));
        assert_eq!(si_scale(1e3), (1.0, "k"));
        assert_eq!(si_scale(0.002), (2.0, "m"));
        assert_eq!(si_scale(0.0), (0.0, ""));
    }

    #[test]
    fn three_significant_digits() {
        assert_eq!(sig3(123.456), "123");
        assert_eq!(sig3(12.345), "12.3");
        assert_eq!(sig3(1.2345), "1.23");
        assert_eq!(sig3(1.0), "1");
        assert_eq!(sig3(999.9), "1000");
    }
}
