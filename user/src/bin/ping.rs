#![no_std]
#![no_main]

use xv6rs_user::{
    net::ip_addr,
    println,
    syscall::{sys_exit, sys_send},
    Args,
};

#[no_mangle]
extern "C" fn _start(argc: i32, argv: *const *const u8) {
    if argc <= 1 {
        println!("argc 0-1");
        sys_exit(0);
    }

    let mut args = Args::new(argc, argv).skip(1);
    let dport = args.next().unwrap();
    let dport: u16 = dport.parse().unwrap();
    let msg = args.next().unwrap();

    match ping(dport, 3, msg) {
        Ok(_) => {
            println!("success");
            sys_exit(0);
        }
        Err(msg) => {
            println!("ping: {}", msg);
            sys_exit(1);
        }
    }
}

fn ping(dport: u16, attempts: usize, msg: &str) -> Result<(), &'static str> {
    let dst_ip = ip_addr(10, 0, 2, 2);
    let sport = 25601;

    for _ in 0..attempts {
        if sys_send(sport, dst_ip, dport, msg.as_bytes()) < 0 {
            return Err("send() failed");
        }
    }

    Ok(())
}
