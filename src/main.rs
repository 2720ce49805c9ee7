use log::error;

fn main() {
    env_logger::init();

    if let Err(e) = ais_ports::get_arg().and_then(ais_ports::run) {
        error!("{e:#}");
        std::process::exit(-1);
    }
}
