fn main() {
    // Only emit ESP-IDF link/env metadata when building the firmware target.
    if std::env::var("CARGO_FEATURE_ESPIDF").is_ok() {
        embuild::espidf::sysenv::output();
    }
}
