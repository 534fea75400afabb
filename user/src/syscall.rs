extern "C" {
    /// int fork()
    fn __fork() -> i32;
    /// int exit(int status)
    fn __exit(status: i32) -> !;
    /// int wait(int *status)
    fn __wait(status: *mut i32) -> i32;
    /// int pipe(int *fd)
    fn __pipe(fd: *mut i32) -> i32;
    /// int read(int fd, char *buf, int n)
    fn __read(fd: i32, addr: *const u8, n: i32) -> i32;
    /// int exec(char *file, char **argv)
    fn __exec(path: *const u8, argv: *const *const u8) -> i32;
    /// int fstat(int fd, struct stat *st)
    fn __fstat(fd: i32, addr: *mut u8) -> i32;
    /// int chdir(char *path)
    fn __chdir(addr: *const u8) -> i32;
    /// int dup(int fd)
    fn __dup(fd: i32) -> i32;
    /// char *sbrk(int n)
    fn __sbrk(n: i32) -> *mut u8;
    /// int open(char *file, int flags)
    fn __open(addr: *const u8, mode: i32) -> i32;
    /// int write(int fd, char *buf, int n)
    fn __write(fd: i32, addr: *const u8, n: i32) -> i32;
    /// int mknod(char *file, short major, short minor)
    fn __mknod(addr: *const u8, major: i16, minor: i16) -> i32;
    /// int unlink(char *file)
    fn __unlink(addr: *const u8) -> i32;
    /// int mkdir(char *file)
    fn __mkdir(addr: *const u8) -> i32;
    /// int close(int fd)
    fn __close(fd: i32) -> i32;
    /// int bind(int port)
    fn __bind(port: i32) -> i32;
    /// int unbind(int port)
    fn __unbind(port: i32) -> i32;
    /// int recv(int dport, char *buf, int maxlen, uint *src, ushort *sport)
    fn __recv(dport: i32, buf: *const u8, maxlen: i32, src: *mut u32, sport: *mut u16) -> i32;
    /// int send(int sport, uint dst, int dport, char *buf, int len)
    fn __send(sport: i32, dst: u32, dport: i32, buf: *const u8, len: i32) -> i32;
    /// void *mmap(void *addr, int len, int prot, int flags, int fd, int offset)
    fn __mmap(addr: *const u8, len: i32, prot: i32, flags: i32, fd: i32, offset: i32) -> *mut u8;
    /// int getenv(char *name, char *buf, int maxlen)
    fn __getenv(name: *const u8, buf: *mut u8, maxlen: i32) -> i32;
    /// int setenv(char *name, char *value, int overwrite)
    fn __setenv(name: *const u8, value: *const u8, overwrite: i32) -> i32;
    /// int unsetenv(char *name)
    fn __unsetenv(name: *const u8) -> i32;
    /// int listenv(char *buf, int maxlen)
    fn __listenv(buf: *mut u8, maxlen: i32) -> i32;
    /// int munmap(void *addr, int length)
    fn __munmap(addr: *const u8, length: i32) -> i32;
}

pub fn sys_fork() -> i32 {
    unsafe { __fork() }
}

pub fn sys_exit(status: i32) -> ! {
    unsafe { __exit(status) }
}

pub fn sys_wait(status: &mut i32) -> i32 {
    unsafe { __wait(status as *mut i32) }
}

pub fn sys_pipe(fd: &mut [i32; 2]) -> i32 {
    unsafe { __pipe(fd.as_mut_ptr()) }
}

pub fn sys_read(fd: i32, buf: &mut [u8]) -> i32 {
    unsafe { __read(fd, buf.as_mut_ptr(), buf.len() as i32) }
}

pub fn sys_exec(path: &str, argv: &[*const u8]) -> i32 {
    unsafe { __exec(path.as_ptr(), argv.as_ptr()) }
}

pub fn sys_fstat<T>(fd: i32, st: &mut T) -> i32 {
    unsafe { __fstat(fd, st as *mut T as *mut u8) }
}

pub fn sys_chdir(path: &str) -> i32 {
    unsafe { __chdir(path.as_ptr()) }
}

pub fn sys_dup(fd: i32) -> i32 {
    unsafe { __dup(fd) }
}

pub fn sys_sbrk(increment: i32) -> *mut u8 {
    unsafe { __sbrk(increment) }
}

pub fn sys_open(path: &str, mode: i32) -> i32 {
    unsafe { __open(path.as_ptr(), mode) }
}

pub fn sys_write(fd: i32, buf: &[u8]) -> i32 {
    unsafe { __write(fd, buf.as_ptr(), buf.len() as i32) }
}

pub fn sys_mknod(path: &str, major: i16, minor: i16) -> i32 {
    unsafe { __mknod(path.as_ptr(), major, minor) }
}

pub fn sys_unlink(path: &str) -> i32 {
    unsafe { __unlink(path.as_ptr()) }
}

pub fn sys_mkdir(path: &str) -> i32 {
    unsafe { __mkdir(path.as_ptr()) }
}

pub fn sys_close(fd: i32) -> i32 {
    unsafe { __close(fd) }
}

/// bind(port): reserve a receive queue for UDP packets addressed to `port`.
pub fn sys_bind(port: u16) -> i32 {
    unsafe { __bind(port as i32) }
}

/// unbind(port): release a queue previously reserved by sys_bind.
pub fn sys_unbind(port: u16) -> i32 {
    unsafe { __unbind(port as i32) }
}

/// recv(dport, buf, &src, &sport): block for one queued packet addressed to
/// dport and copy it (and its sender's address) into buf.
pub fn sys_recv(dport: u16, buf: &mut [u8], src: &mut u32, sport: &mut u16) -> i32 {
    unsafe {
        __recv(
            dport as i32,
            buf.as_mut_ptr(),
            buf.len() as i32,
            src as *mut u32,
            sport as *mut u16,
        )
    }
}

/// send(sport, dst, dport, buf): build and transmit one UDP datagram.
pub fn sys_send(sport: u16, dst: u32, dport: u16, buf: &[u8]) -> i32 {
    unsafe { __send(sport as i32, dst, dport as i32, buf.as_ptr(), buf.len() as i32) }
}

pub fn sys_mmap(addr: *const u8, len: usize, prot: i32, flags: i32, fd: i32, offset: usize) -> *mut u8 {
    unsafe { __mmap(addr, len as i32, prot, flags, fd, offset as i32) }
}

pub fn sys_munmap(addr: *const u8, length: usize) -> i32 {
    unsafe { __munmap(addr, length as i32) }
}

pub fn sys_getenv(name: &str, buf: &mut [u8]) -> i32 {
    unsafe { __getenv(name.as_ptr(), buf.as_mut_ptr(), buf.len() as i32) }
}

pub fn sys_setenv(name: &str, value: &str, overwrite: bool) -> i32 {
    unsafe { __setenv(name.as_ptr(), value.as_ptr(), overwrite as i32) }
}

pub fn sys_unsetenv(name: &str) -> i32 {
    unsafe { __unsetenv(name.as_ptr()) }
}

pub fn sys_listenv(buf: &mut [u8]) -> i32 {
    unsafe { __listenv(buf.as_mut_ptr(), buf.len() as i32) }
}
