#![no_std]
#![no_main]

use core::str::from_utf8_unchecked;

use xv6rs_user::{
    println,
    syscall::{sys_bind, sys_exit, sys_recv, sys_unbind},
    Args,
};

#[no_mangle]
extern "C" fn _start(argc: i32, argv: *const *const u8) {
    if argc <= 1 {
        println!("argc 0-1");
        sys_exit(0);
    }

    let mut args = Args::new(argc, argv).skip(1);
    let port = args.next().unwrap();
    let port: u16 = port.parse().unwrap();

    match serve(port) {
        Ok(_) => {
            println!("success");
            sys_exit(0);
        }
        Err(msg) => {
            println!("udp-server: {}", msg);
            sys_exit(1);
        }
    }
}

fn serve(port: u16) -> Result<(), &'static str> {
    if sys_bind(port) < 0 {
        return Err("bind failed");
    }
    println!("bound port {}", port);

    let mut buf = [0u8; 1024];
    let mut src = 0u32;
    let mut sport = 0u16;
    let n = sys_recv(port, &mut buf, &mut src, &mut sport);

    println!("n={} msg={}", n, unsafe { from_utf8_unchecked(&buf) });

    sys_unbind(port);

    Ok(())
}
