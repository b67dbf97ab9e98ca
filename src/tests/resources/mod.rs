mod shell_tests;
mod vm_tests;
mod volume_tests;
