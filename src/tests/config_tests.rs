use crate::config::{parse_num, Config};
use crate::device::MmapDevice;

#[test]
fn defaults_match_the_device_node() {
    let cfg = Config::default();
    assert_eq!(cfg.dev_name, "my_mmap");
    assert_eq!(cfg.minor, 99);
    assert_eq!(cfg.map_pages, 1);
    let dev = MmapDevice::from_config(&cfg);
    assert_eq!(dev.name(), "my_mmap");
    assert_eq!(dev.minor(), 99);
}

#[test]
fn numbers_accept_float_notation() {
    assert_eq!(parse_num("42"), Some(42));
    assert_eq!(parse_num("1e6"), Some(1_000_000));
    assert_eq!(parse_num("2.5"), Some(2));
    assert_eq!(parse_num("-3"), None);
    assert_eq!(parse_num("many"), None);
}
