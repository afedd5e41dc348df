//! Deterministic identicon avatars.

use uuid::Uuid;

const AVATAR_NAMESPACE: Uuid = Uuid::from_u128(0x8c3e_55a1_07d4_4b8e_b1f2_6a90_3c7d_e215);
const GRID: usize = 5;
const CELL: usize = 20;

/// Render the avatar for `seed` as SVG bytes. The same seed always yields the same image.
pub fn render(seed: u64) -> Vec<u8> {
    let digest = Uuid::new_v5(&AVATAR_NAMESPACE, &seed.to_be_bytes());
    let bytes = digest.as_bytes();
    let hue = u16::from_be_bytes([bytes[0], bytes[1]]) % 360;
    let fill = format!("hsl({hue},65%,55%)");

    let size = GRID * CELL;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {size} {size}" width="{size}" height="{size}"><rect width="{size}" height="{size}" fill="hsl({hue},30%,94%)"/>"#
    );
    let half = GRID.div_ceil(2);
    for row in 0..GRID {
        for col in 0..half {
            let bit = row * half + col;
            if bytes[2 + bit / 8] >> (bit % 8) & 1 == 0 {
                continue;
            }
            for x in [col, GRID - 1 - col] {
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{CELL}" height="{CELL}" fill="{fill}"/>"#,
                    x * CELL,
                    row * CELL
                ));
                if x == GRID - 1 - x {
                    break;
                }
            }
        }
    }
    svg.push_str("</svg>");
    svg.into_bytes()
}

/// Avatar bytes as text for views.
pub fn as_text(avatar: &[u8]) -> String {
    String::from_utf8_lossy(avatar).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_avatar() {
        assert_eq!(render(42), render(42));
        assert_ne!(render(42), render(43));
    }

    #[test]
    fn output_is_svg() {
        let svg = as_text(&render(7));
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
    }
}
