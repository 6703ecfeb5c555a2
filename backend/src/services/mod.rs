//! Business logic services for the Storefront Books back-end

pub mod account;
pub mod accounting;
pub mod customer;
pub mod payment;
pub mod product;
pub mod purchase;
pub mod purchase_return;
pub mod quotation;
pub mod quotation_return;
pub mod sales;
pub mod sales_return;
pub mod serializer;
pub mod serials;
pub mod stats;
pub mod store;
pub mod vendor;
pub mod voucher;

pub use account::AccountService;
pub use accounting::AccountingService;
pub use customer::CustomerService;
pub use payment::PaymentService;
pub use product::ProductService;
pub use purchase::PurchaseService;
pub use purchase_return::PurchaseReturnService;
pub use quotation::QuotationService;
pub use quotation_return::QuotationReturnService;
pub use sales::SalesService;
pub use sales_return::SalesReturnService;
pub use serializer::StoreSerializer;
pub use serials::SerialAllocator;
pub use store::StoreService;
pub use vendor::VendorService;
pub use voucher::VoucherService;
