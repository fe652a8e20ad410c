use polyglot::codegen::backend::ALL;

pub fn run() -> i32 {
    for backend in ALL {
        let options: Vec<&str> = backend.accepted().iter().map(|key| key.name()).collect();
        println!(
            "{:<8} {:<26} options: {}",
            backend.name(),
            backend.display_name(),
            options.join(", ")
        );
    }
    0
}
