use rand::Rng;

const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 生成8位券码（去除易混淆字符）
pub fn generate_voucher_code() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// 生成订单号: VL + 日期 + 6位随机数字
pub fn generate_order_no() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "VL{}{:06}",
        chrono::Utc::now().format("%Y%m%d"),
        rng.gen_range(0..=999999)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_voucher_code() {
        let code = generate_voucher_code();
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
        // 不应包含易混淆字符
        assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
    }

    #[test]
    fn test_generate_order_no() {
        let order_no = generate_order_no();
        assert!(order_no.starts_with("VL"));
        assert_eq!(order_no.len(), 2 + 8 + 6);
    }
}
