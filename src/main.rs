fn main() {
    interface_gen::run()
}
