use fanout::app;

fn main() {
    std::process::exit(app::startup::startup());
}
