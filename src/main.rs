fn main() {
    std::process::exit(kalesp_host_lib::run())
}
