// Kernel error handling and errno definitions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    OutOfMemory,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    IoError,
    NotInitialized,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    ENOENT = 2,        // No such file or directory
    ESRCH = 3,         // No such process
    EIO = 5,           // I/O error
    EBADF = 9,         // Bad file descriptor
    ENOMEM = 12,       // Out of memory
    EFAULT = 14,       // Bad address
    EEXIST = 17,       // File exists
    ENOTDIR = 20,      // Not a directory
    EISDIR = 21,       // Is a directory
    EINVAL = 22,       // Invalid argument
    EMFILE = 24,       // Too many open files
    ESPIPE = 29,       // Illegal seek
    ENAMETOOLONG = 36, // File name too long
    ENOSYS = 38,       // Function not implemented
}

impl From<KernelError> for Errno {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory => Errno::ENOMEM,
            KernelError::InvalidArgument => Errno::EINVAL,
            KernelError::NotFound => Errno::ENOENT,
            KernelError::AlreadyExists => Errno::EEXIST,
            KernelError::IoError => Errno::EIO,
            KernelError::NotInitialized => Errno::EINVAL,
        }
    }
}

impl Errno {
    /// Negated value, for the syscall return convention.
    pub fn as_isize(self) -> isize {
        -(self as i32 as isize)
    }

    pub fn as_i64(self) -> i64 {
        -(self as i32 as i64)
    }

    pub fn description(self) -> &'static str {
        match self {
            Errno::ENOENT => "No such file or directory",
            Errno::ESRCH => "No such process",
            Errno::EIO => "I/O error",
            Errno::EBADF => "Bad file descriptor",
            Errno::ENOMEM => "Out of memory",
            Errno::EFAULT => "Bad address",
            Errno::EEXIST => "File exists",
            Errno::ENOTDIR => "Not a directory",
            Errno::EISDIR => "Is a directory",
            Errno::EINVAL => "Invalid argument",
            Errno::EMFILE => "Too many open files",
            Errno::ESPIPE => "Illegal seek",
            Errno::ENAMETOOLONG => "File name too long",
            Errno::ENOSYS => "Function not implemented",
        }
    }
}

pub type Result<T> = core::result::Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_negation() {
        assert_eq!(Errno::ENOENT.as_isize(), -2);
        assert_eq!(Errno::EFAULT.as_i64(), -14);
        assert_eq!(Errno::ENAMETOOLONG.as_isize(), -36);
    }

    #[test]
    fn kernel_error_mapping() {
        assert_eq!(Errno::from(KernelError::OutOfMemory), Errno::ENOMEM);
        assert_eq!(Errno::from(KernelError::NotFound), Errno::ENOENT);
    }
}
