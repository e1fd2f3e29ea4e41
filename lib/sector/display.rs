//! Human-readable listing of sector amplitudes.
//!
//! Amplitudes are written as Python would `repr` a complex number, so that
//! listings can be compared directly against other tools.

use std::fmt;
use num_complex::Complex64 as C64;
use crate::sector::Sector;

/// Amplitudes with magnitude at or below this value are not listed.
pub const DEF_PRINT_THRESHOLD: f64 = 1e-4;

// shortest round-trip representation with no forced fractional part
fn repr_float(x: f64) -> String {
    if x.is_nan() { return "nan".to_string(); }
    if x.is_infinite() {
        return if x > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let sign = if x.is_sign_negative() { "-" } else { "" };
    let sci = format!("{:e}", x.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let body = if (-4..16).contains(&exp) {
        if exp < 0 {
            format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
        } else {
            let point = exp as usize + 1;
            if digits.len() <= point {
                format!("{}{}", digits, "0".repeat(point - digits.len()))
            } else {
                format!("{}.{}", &digits[..point], &digits[point..])
            }
        }
    } else {
        let (lead, rest) = digits.split_at(1);
        let frac = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        let esign = if exp < 0 { '-' } else { '+' };
        format!("{lead}{frac}e{esign}{:02}", exp.abs())
    };
    format!("{sign}{body}")
}

fn repr_complex(z: C64) -> String {
    let imag_sign = if z.im.is_sign_negative() { '-' } else { '+' };
    let imag = repr_float(z.im.abs());
    if z.re == 0.0 && !z.re.is_sign_negative() {
        format!("{}j", repr_float(z.im))
    } else {
        format!("({}{}{}j)", repr_float(z.re), imag_sign, imag)
    }
}

impl Sector {
    /// Listing of all amplitudes with magnitude above `threshold`, one line
    /// `<alpha string>:<beta string> <amplitude>` each, strings in binary,
    /// under a header naming the sector.
    pub fn sector_string(&self, threshold: f64) -> String {
        let mut lines: Vec<String> = vec![format!(
            "Sector N = {} : S_z = {}", self.n_electrons(), self.sz2())];
        lines.extend(
            self.iter_strings()
                .filter(|(_, _, c)| c.norm() > threshold)
                .map(|(a, b, c)| format!("{:b}:{:b} {}", a, b, repr_complex(c)))
        );
        lines.join("\n")
    }

    /// Print [`Self::sector_string`] with the default threshold.
    pub fn print_sector(&self) {
        println!("{}", self.sector_string(DEF_PRINT_THRESHOLD));
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sector_string(DEF_PRINT_THRESHOLD))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn float_repr() {
        assert_eq!(repr_float(0.28037731872261007), "0.28037731872261007");
        assert_eq!(repr_float(-1.281809519779826), "-1.281809519779826");
        assert_eq!(repr_float(-0.021023741905447858), "-0.021023741905447858");
        assert_eq!(repr_float(1.0), "1");
        assert_eq!(repr_float(120.0), "120");
        assert_eq!(repr_float(0.0), "0");
        assert_eq!(repr_float(-0.0), "-0");
        assert_eq!(repr_float(1.5e-5), "1.5e-05");
        assert_eq!(repr_float(1e16), "1e+16");
        assert_eq!(repr_float(2.5e-300), "2.5e-300");
        assert_eq!(repr_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(repr_float(f64::NAN), "nan");
    }

    #[test]
    fn complex_repr() {
        assert_eq!(repr_complex(C64::new(1.0, 0.0)), "(1+0j)");
        assert_eq!(repr_complex(C64::new(1.0, -0.0)), "(1-0j)");
        assert_eq!(repr_complex(C64::new(0.0, 2.5)), "2.5j");
        assert_eq!(repr_complex(C64::new(0.0, -2.5)), "-2.5j");
        assert_eq!(repr_complex(C64::new(-0.0, 1.0)), "(-0+1j)");
        assert_eq!(repr_complex(C64::new(-0.5, -0.25)), "(-0.5-0.25j)");
    }

    const LISTING: &str = "\
Sector N = 3 : S_z = 1
11:1 (0.28037731872261007+0.32599673701893295j)
11:10 (-0.20776778596031897-0.44964676904932527j)
11:100 (-0.5982592155589743+0.8138588036401146j)
101:1 (-0.7693909581835316+0.5010963131770999j)
101:10 (-0.1070553281124611-0.28468034534579584j)
101:100 (-1.281809519779826+0.44627728700958064j)
110:1 (-1.0699984614118179+0.33282913446024576j)
110:10 (1.150470965359522+0.028245225856149195j)
110:100 (0.3009872766528208-0.021023741905447858j)";

    #[test]
    fn sector_listing() {
        let data: [[C64; 3]; 3] = [
            [
                C64::new(0.28037731872261007, 0.32599673701893295),
                C64::new(-0.20776778596031897, -0.44964676904932527),
                C64::new(-0.5982592155589743, 0.8138588036401146),
            ],
            [
                C64::new(-0.7693909581835316, 0.5010963131770999),
                C64::new(-0.1070553281124611, -0.28468034534579584),
                C64::new(-1.281809519779826, 0.44627728700958064),
            ],
            [
                C64::new(-1.0699984614118179, 0.33282913446024576),
                C64::new(1.150470965359522, 0.028245225856149195),
                C64::new(0.3009872766528208, -0.021023741905447858),
            ],
        ];
        let mut sector = Sector::new(2, 1, 3).unwrap();
        for (a, row) in [0b011, 0b101, 0b110].into_iter().zip(data.iter()) {
            for (b, c) in [0b001, 0b010, 0b100].into_iter().zip(row.iter()) {
                sector.set_element(a, b, *c).unwrap();
            }
        }
        assert_eq!(sector.sector_string(DEF_PRINT_THRESHOLD), LISTING);
        assert_eq!(sector.to_string(), LISTING);

        sector.set_element(0b101, 0b010, C64::new(1e-5, 0.0)).unwrap();
        assert!(!sector.sector_string(DEF_PRINT_THRESHOLD).contains("101:10 "));
        assert_eq!(sector.sector_string(1e-6).lines().count(), 10);
    }
}
