fn main() {
    // v4l2 capture devices, process groups and `iw`/`iwlist` are linux-only
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        panic!("This program only runs on linux");
    }
}
