#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(xv6rs_user::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::str::from_utf8_unchecked;

use xv6rs_user::{entry_point, println, syscall::sys_listenv, Args};

entry_point!(main);

fn main(_args: &mut Args) -> Result<i32, &'static str> {
    let mut buf = [0u8; 4096];

    let len = sys_listenv(&mut buf);

    if len <= 0 {
        if len == 0 {
            println!("No environment variables set.");
        } else {
            println!("Error listing environment variables.");
        }
        return Ok(0);
    }

    let mut pos = 0;
    while pos < len as usize {
        let mut end = pos;
        while end < len as usize && buf[end] != 0 {
            end += 1;
        }

        let env_var = unsafe { from_utf8_unchecked(&buf[pos..end]) };
        println!("{}", env_var);

        pos = end + 1;
    }

    Ok(0)
}
