//! VM SKU capability lookups.

/// VM sizes that carry an NVIDIA GPU supported by the node image driver
/// installation. Stored lower-case.
const NVIDIA_ENABLED_SKUS: &[&str] = &[
    // K80
    "standard_nc6",
    "standard_nc12",
    "standard_nc24",
    "standard_nc24r",
    // M60
    "standard_nv6",
    "standard_nv12",
    "standard_nv12s_v3",
    "standard_nv24",
    "standard_nv24s_v3",
    "standard_nv24r",
    "standard_nv48s_v3",
    // P40
    "standard_nd6s",
    "standard_nd12s",
    "standard_nd24s",
    "standard_nd24rs",
    // P100
    "standard_nc6s_v2",
    "standard_nc12s_v2",
    "standard_nc24s_v2",
    "standard_nc24rs_v2",
    // V100
    "standard_nc6s_v3",
    "standard_nc12s_v3",
    "standard_nc24s_v3",
    "standard_nc24rs_v3",
    "standard_nd40s_v3",
    "standard_nd40rs_v2",
    // T4
    "standard_nc4as_t4_v3",
    "standard_nc8as_t4_v3",
    "standard_nc16as_t4_v3",
    "standard_nc64as_t4_v3",
    // A100
    "standard_nd96asr_v4",
    "standard_nd112asr_a100_v4",
    "standard_nd120asr_a100_v4",
    "standard_nd96amsr_a100_v4",
    "standard_nd112amsr_a100_v4",
    "standard_nd120amsr_a100_v4",
    "standard_nc24ads_a100_v4",
    "standard_nc48ads_a100_v4",
    "standard_nc96ads_a100_v4",
    // H100
    "standard_nd96isr_h100_v5",
    "standard_nc40ads_h100_v5",
    "standard_nc80adis_h100_v5",
];

/// Returns whether `vm_size` is a GPU SKU that needs the NVIDIA driver
/// installed during bootstrap. The comparison ignores case.
pub fn is_nvidia_enabled_sku(vm_size: &str) -> bool {
    let vm_size = vm_size.to_ascii_lowercase();
    NVIDIA_ENABLED_SKUS.contains(&vm_size.as_str())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Standard_NC6", true)]
    #[case("standard_nc24ads_a100_v4", true)]
    #[case("STANDARD_ND96ISR_H100_V5", true)]
    #[case("Standard_D2s_v3", false)]
    #[case("", false)]
    fn nvidia_skus(#[case] vm_size: &str, #[case] expected: bool) {
        assert_eq!(is_nvidia_enabled_sku(vm_size), expected);
    }
}
