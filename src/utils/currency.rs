/// 格式化金额为越南盾显示格式: 1234567 -> "1.234.567₫"
pub fn format_vnd(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if negative {
        format!("-{grouped}₫")
    } else {
        format!("{grouped}₫")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(0), "0₫");
        assert_eq!(format_vnd(500), "500₫");
        assert_eq!(format_vnd(1000), "1.000₫");
        assert_eq!(format_vnd(200000), "200.000₫");
        assert_eq!(format_vnd(1234567), "1.234.567₫");
        assert_eq!(format_vnd(-50000), "-50.000₫");
    }
}
