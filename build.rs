fn main() {
    // Only the device build needs the ESP-IDF environment exported;
    // host builds (tests, simulator) have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
