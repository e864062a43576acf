fn main() {
    std::process::exit(nebula_tracker_lib::run());
}
