pub mod ddlz;
pub mod ddp2;
pub mod ddp3;
pub mod hxb;
pub mod sniff;
