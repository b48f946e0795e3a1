//! Count one event on the current core.
//!
//! Userspace access must already have been granted on every core (PMCR0 bit 30), for instance by
//! a kernel module calling `pmu_enable` on each of them.

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
fn main() -> m1_pmu::Result<()> {
    use log::info;
    use m1_pmu::percpu::on_cpu;
    use m1_pmu::pmu::parse_event_id;

    env_logger::init();

    // Event to count
    let event = match std::env::args().nth(1) {
        Some(a) => a,
        None => std::env::var("PMU_EVENT").unwrap_or_else(|_| String::from("0x8c")),
    };
    let event = parse_event_id(&event)?;

    let cpu = m1_pmu::percpu::online_cpus()?[0];
    let midr = m1_pmu::cpu::ensure_apple(cpu)?;
    info!("Counting event {:#x} on cpu {} ({})", event, cpu, midr);

    on_cpu(cpu, || unsafe {
        m1_pmu::set_event_id(event);
        m1_pmu::clear_all_counters();
        m1_pmu::enable_all_counters();

        // Workload
        let sum: u64 = (0u64..1_000_000).filter(|x| x % 3 == 0).sum();
        info!("Workload result {}", sum);

        m1_pmu::disable_all_counters();
        m1_pmu::read_all_counters();
    })?;

    for idx in 0..m1_pmu::NUM_COUNTERS {
        info!("PMC{} = {}", idx, m1_pmu::get_counter(idx)?);
    }
    Ok(())
}

#[cfg(not(all(target_arch = "aarch64", target_os = "linux")))]
fn main() {
    eprintln!("This demo needs an aarch64 Linux host");
}
